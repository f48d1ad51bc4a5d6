use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const CABLE_SUBPROTOCOL: &str = "cable";

/// An inbound event delivered by a [`Transport`]. There is no separate
/// `open`/`error` variant here: `Transport::connect` surfaces those
/// synchronously via its `Result`.
#[derive(Debug)]
pub enum TransportEvent {
    Message(Bytes),
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// A duplex binary channel. The session engine owns exactly one
/// instance at a time and drives it from its single event loop —
/// `&mut self` throughout means no interior locking is required.
#[async_trait::async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;
    async fn recv(&mut self) -> Result<TransportEvent, TransportError>;
    async fn close(&mut self);
}

/// Default transport: a WebSocket connection negotiating the `cable`
/// subprotocol, built on `tokio-tungstenite`.
pub struct WebSocketTransport {
    url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        // `into_client_request` already fills in the standard upgrade
        // headers (Connection, Upgrade, Sec-WebSocket-Key/Version);
        // only the subprotocol needs adding for `cable` negotiation.
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(TransportError::WebSocket)?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, CABLE_SUBPROTOCOL.parse().unwrap());

        let (stream, _response) = connect_async(request).await?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Other("not connected".into()))?;
        stream.send(WsMessage::Binary(frame.to_vec())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<TransportEvent, TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Other("not connected".into()))?;
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Binary(bytes))) => {
                    return Ok(TransportEvent::Message(Bytes::from(bytes)))
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    return Ok(TransportEvent::Closed {
                        code: frame.as_ref().map(|f| f.code.into()),
                        reason: frame.map(|f| f.reason.to_string()),
                    })
                }
                // Text/Ping/Pong frames are WebSocket-layer control traffic,
                // not Cable packets; tungstenite answers Ping for us.
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
                None => {
                    return Ok(TransportEvent::Closed {
                        code: None,
                        reason: None,
                    })
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            let _ = stream.close(None).await;
        }
        self.stream = None;
    }
}
