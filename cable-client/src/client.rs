use std::sync::Arc;

use cable_wire::{CloseCode, Identity, PropertyMap, Qos, ResponsePacket};
use tokio::sync::oneshot;

use crate::error::SessionError;
use crate::handler::{Handler, SessionStatus};
use crate::options::ClientOptions;
use crate::retry::RetryConfig;
use crate::session::{self, Command, SessionHandle};
use crate::transport::{Transport, WebSocketTransport};

/// A Cable session. Cheap to clone: every clone shares the same
/// underlying session task via an unbounded command channel.
#[derive(Clone)]
pub struct Client {
    handle: Arc<SessionHandle>,
}

impl Client {
    /// Connects over a WebSocket negotiating the `cable` subprotocol.
    pub fn new(url: impl Into<String>, options: ClientOptions, handler: Arc<dyn Handler>) -> Self {
        Self::with_transport(Box::new(WebSocketTransport::new(url)), options, handler)
    }

    /// Connects over a caller-supplied [`Transport`] — the hook tests use
    /// to swap in a `MockTransport`.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        options: ClientOptions,
        handler: Arc<dyn Handler>,
    ) -> Self {
        let handle = session::spawn(transport, handler, options, RetryConfig::default());
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Begins (or resumes, after a close) the handshake with `identity`.
    pub fn connect(&self, identity: Identity) {
        let _ = self.handle.commands.send(Command::Connect(identity));
    }

    /// Sends a protocol-level `Close` and tears the session down. Pending
    /// `send`/`request` futures resolve with `SessionError::Disconnected`.
    pub fn close(&self, code: Option<CloseCode>) {
        let _ = self.handle.commands.send(Command::Close(code));
    }

    /// Replaces the reconnection policy used after the session leaves
    /// `Opened` unexpectedly.
    pub fn auto_retry(&self, config: RetryConfig) {
        let _ = self.handle.commands.send(Command::SetAutoRetry(config));
    }

    /// The current state-machine status.
    pub fn status(&self) -> SessionStatus {
        *self.handle.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Opened
    }

    /// The `connId` property the server assigned on the current
    /// connection, if any; `None` before `Opened` and after the session
    /// leaves it.
    pub fn id(&self) -> Option<String> {
        self.handle.conn_id.borrow().clone()
    }

    /// Publishes `payload` under `kind` (0..=63). `Qos::Qos1` resolves
    /// only once the peer's `Messack` arrives, retrying with `dup=true`
    /// up to `ClientOptions::message_max_retry` times.
    pub async fn send(
        &self,
        kind: u8,
        payload: Vec<u8>,
        qos: Qos,
        props: PropertyMap,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.handle
            .commands
            .send(Command::Send {
                kind,
                payload,
                qos,
                props,
                responder: tx,
            })
            .map_err(|_| SessionError::NotReady)?;
        rx.await.map_err(|_| SessionError::NotReady)?
    }

    /// Issues a `Request` and awaits the matching `Response`, or
    /// `SessionError::RequestTimeout` after `ClientOptions::request_timeout`.
    pub async fn request(
        &self,
        method: impl Into<String>,
        body: Vec<u8>,
        props: PropertyMap,
    ) -> Result<ResponsePacket, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.handle
            .commands
            .send(Command::Request {
                method: method.into(),
                body,
                props,
                responder: tx,
            })
            .map_err(|_| SessionError::NotReady)?;
        rx.await.map_err(|_| SessionError::NotReady)?
    }
}
