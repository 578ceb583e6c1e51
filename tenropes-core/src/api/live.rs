use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, info};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as Frame;

use crate::models::ChannelId;

/// Raw JSON payloads pushed by the server, in delivery order. Dropping the
/// stream closes the connection.
pub type LiveStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait LiveTransport: Send + Sync {
    async fn subscribe(&self, channel_id: ChannelId) -> Result<LiveStream>;
}

/// WebSocket push connection, one per channel and session token.
pub struct SocketTransport {
    ws_base: String,
    token: String,
}

impl SocketTransport {
    /// `base_url` is the REST base, its scheme is switched to `ws`/`wss`.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            ws_base: websocket_base(base_url),
            token: token.to_string(),
        }
    }

    pub fn channel_url(&self, channel_id: ChannelId) -> String {
        format!(
            "{}/ws/channel/{}/token/{}",
            self.ws_base, channel_id, self.token
        )
    }
}

fn websocket_base(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    }
}

#[async_trait]
impl LiveTransport for SocketTransport {
    async fn subscribe(&self, channel_id: ChannelId) -> Result<LiveStream> {
        let (socket, _response) = connect_async(self.channel_url(channel_id))
            .await
            .with_context(|| format!("Failed to connect live feed for channel {channel_id}"))?;
        info!("live feed connected for channel {channel_id}");

        let frames = socket.filter_map(|frame| async move {
            match frame {
                Ok(Frame::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Frame::Binary(bytes)) => {
                    Some(String::from_utf8(bytes.to_vec()).context("live frame is not UTF-8"))
                }
                Ok(Frame::Close(reason)) => {
                    debug!("live feed closed by server: {:?}", reason);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(anyhow::Error::new(e).context("live feed error"))),
            }
        });

        Ok(frames.boxed())
    }
}
