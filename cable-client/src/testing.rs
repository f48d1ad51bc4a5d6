//! An in-memory [`Transport`] for deterministic tests. Not part of the
//! crate's public protocol surface — gated behind `test-util`.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::transport::{Transport, TransportError, TransportEvent};

/// The test-side handle to a [`MockTransport`]: lets a test observe
/// frames the engine wrote and inject inbound frames/closure.
pub struct MockTransportHandle {
    pub to_engine: mpsc::UnboundedSender<TransportEvent>,
    pub from_engine: mpsc::UnboundedReceiver<Bytes>,
}

pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<Bytes>,
    connected: bool,
    fail_connect: bool,
}

impl MockTransport {
    /// Builds a connected pair: the engine-facing `MockTransport` and a
    /// test-facing `MockTransportHandle`.
    pub fn pair() -> (Self, MockTransportHandle) {
        let (to_engine_tx, to_engine_rx) = mpsc::unbounded_channel();
        let (from_engine_tx, from_engine_rx) = mpsc::unbounded_channel();
        (
            Self {
                inbound: to_engine_rx,
                outbound: from_engine_tx,
                connected: false,
                fail_connect: false,
            },
            MockTransportHandle {
                to_engine: to_engine_tx,
                from_engine: from_engine_rx,
            },
        )
    }

    pub fn pair_failing_connect() -> (Self, MockTransportHandle) {
        let (mut transport, handle) = Self::pair();
        transport.fail_connect = true;
        (transport, handle)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.fail_connect {
            return Err(TransportError::Other("mock connect refused".into()));
        }
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Other("test harness dropped".into()))
    }

    async fn recv(&mut self) -> Result<TransportEvent, TransportError> {
        match self.inbound.recv().await {
            Some(event) => Ok(event),
            None => Ok(TransportEvent::Closed {
                code: None,
                reason: None,
            }),
        }
    }

    async fn close(&mut self) {
        self.connected = false;
    }
}
