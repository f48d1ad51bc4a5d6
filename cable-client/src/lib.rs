//! Async session engine for the Cable wire protocol defined by
//! [`cable_wire`]: connection handshake, heartbeat, QoS-1 delivery,
//! request/response correlation, and reconnection with backoff.

mod client;
mod error;
mod handler;
mod options;
mod retry;
mod session;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cable_wire::{
    CloseCode, ConnackCode, Identity, Property, PropertyMap, Qos, RequestPacket, ResponsePacket,
    StatusCode,
};

pub use client::Client;
pub use error::SessionError;
pub use handler::{Handler, InboundMessage, InboundRequest, SessionStatus};
pub use options::ClientOptions;
pub use retry::{Backoff, RetryConfig, RetryReason, ShouldSuppress};
pub use transport::{Transport, TransportError, TransportEvent, WebSocketTransport};
