use cable_wire::{PropertyMap, ResponsePacket, StatusCode};

/// One of the five session states. `Opened` is the only state in which
/// `send`/`request` are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unknown,
    Opening,
    Opened,
    Closing,
    Closed,
}

/// A `Message` delivered to the handler. QoS-1 messages are already
/// acknowledged by the time this reaches `on_message`.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub kind: u8,
    pub payload: Vec<u8>,
    pub props: PropertyMap,
}

/// A `Request` delivered to the handler; the handler must produce a
/// `Response` synchronously (see the "cyclic reference" design note —
/// this avoids the handler needing a back-reference to the client).
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub body: Vec<u8>,
    pub props: PropertyMap,
}

impl InboundRequest {
    pub fn respond(&self, code: StatusCode, body: Vec<u8>) -> ResponsePacket {
        ResponsePacket {
            id: 0, // overwritten by the session engine with this request's id
            code,
            body,
            props: PropertyMap::new(),
        }
    }
}

/// External collaborator that reacts to session lifecycle events and
/// inbound traffic. Implementations must be cheap to call from the
/// session's single-threaded event loop — do not block.
pub trait Handler: Send + Sync {
    fn on_status(&self, status: SessionStatus) {
        let _ = status;
    }

    fn on_message(&self, message: InboundMessage) {
        let _ = message;
    }

    /// Must return the `Response` to send back. There is no default;
    /// a handler that never serves requests should still return an
    /// explicit `NotFound`-style response rather than panicking.
    fn on_request(&self, request: InboundRequest) -> ResponsePacket;
}
