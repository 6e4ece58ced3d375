//! Frame transport under an evaluation session.
//!
//! [`WsTransport`] wraps a `tokio-tungstenite` client socket; tests drive the
//! session through scripted implementations of [`FrameTransport`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

use crate::error::{ProxyError, Result};

/// One inbound unit as seen by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close { code: Option<u16>, reason: String },
    /// Ping/pong and raw frames; handled by the socket itself.
    Control,
}

#[async_trait]
pub trait FrameTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound frame, `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>>;

    /// Close with the given code. Failures are logged, never surfaced.
    async fn close(&mut self, code: u16, reason: &str);
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client WebSocket to the vendor.
pub struct WsTransport {
    stream: WsStream,
}

impl WsTransport {
    pub async fn connect(url: &Url) -> Result<Self> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(classify_handshake_error)?;
        debug!(status = %response.status(), "vendor socket upgraded");
        Ok(Self { stream })
    }
}

/// A rejected upgrade with 401/403 means the signature was refused.
fn classify_handshake_error(err: WsError) -> ProxyError {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            let body = response
                .body()
                .as_deref()
                .map(|b| crate::utils::body_preview(b, 200))
                .unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                ProxyError::Auth(format!("vendor refused the signed upgrade ({}): {}", status, body))
            } else {
                ProxyError::ConnectionFailed(format!("upgrade failed ({}): {}", status, body))
            }
        }
        other => ProxyError::from(other),
    }
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        let msg = match self.stream.next().await? {
            Ok(msg) => msg,
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok(match msg {
            WsMessage::Text(text) => InboundFrame::Text(text),
            WsMessage::Binary(data) => InboundFrame::Binary(data),
            WsMessage::Close(frame) => InboundFrame::Close {
                code: frame.as_ref().map(|f| u16::from(f.code)),
                reason: frame.map(|f| f.reason.into_owned()).unwrap_or_default(),
            },
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => InboundFrame::Control,
        }))
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            debug!("vendor socket close: {}", e);
        }
    }
}
