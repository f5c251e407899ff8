//! The RTM WebSocket, behind a small trait so sessions can run on fakes.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open realtime connection yielding text frames.
#[async_trait]
pub trait RtmSocket: Send {
    /// Next text frame. `None` once the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close from our side.
    async fn close(&mut self) -> Result<()>;
}

/// Opens [`RtmSocket`]s for the URL handed out by `rtm.start`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn RtmSocket>>;
}

/// [`Transport`] over tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn RtmSocket>> {
        tracing::debug!("Opening RTM WebSocket");
        let (ws, _response) = connect_async(url).await?;
        tracing::debug!("RTM WebSocket connected");
        Ok(Box::new(WsSocket { ws }))
    }
}

struct WsSocket {
    ws: WsStream,
}

#[async_trait]
impl RtmSocket for WsSocket {
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "RTM WebSocket closed by peer");
                    return None;
                }
                // tungstenite answers pings itself.
                Ok(
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_),
                ) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
