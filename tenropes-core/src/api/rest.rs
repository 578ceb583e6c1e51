use crate::models::{ChannelId, ChannelMetadata, Content, Message, UserMetadata};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response, StatusCode, header};
use std::time::Duration;

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// One page of at most 40 messages, oldest first, starting `offset` messages
    /// back from the newest. Empty once history is exhausted.
    async fn fetch_channel_history(
        &self,
        channel_id: ChannelId,
        offset: usize,
    ) -> Result<Vec<Message>>;
    async fn fetch_members(&self, usernames: &[String]) -> Result<Vec<UserMetadata>>;
    async fn send_message(&self, channel_id: ChannelId, content: &Content) -> Result<()>;
    async fn fetch_channels(&self) -> Result<Vec<ChannelMetadata>>;
}

pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Session token contains invalid header characters")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            bail!("cannot {action}, permission denied ({status}): {error_text}")
        }
        _ => bail!("cannot {action} with status {status}: {error_text}"),
    }
}

#[async_trait]
impl ChatApi for RestClient {
    async fn fetch_channel_history(
        &self,
        channel_id: ChannelId,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let url = format!(
            "{}/protected/channel/{}/messages/{}",
            self.base_url, channel_id, offset
        );
        debug!("GET {url}");

        let response = self.client.get(&url).send().await?;
        let messages = ensure_success(response, "get messages")
            .await?
            .json()
            .await
            .with_context(|| format!("Invalid history page for channel {channel_id}"))?;
        Ok(messages)
    }

    async fn fetch_members(&self, usernames: &[String]) -> Result<Vec<UserMetadata>> {
        let url = format!("{}/protected/user/meta", self.base_url);
        debug!("POST {url} for {} users", usernames.len());

        let response = self.client.post(&url).json(usernames).send().await?;
        let members = ensure_success(response, "get user data")
            .await?
            .json()
            .await
            .context("Invalid user metadata")?;
        Ok(members)
    }

    async fn send_message(&self, channel_id: ChannelId, content: &Content) -> Result<()> {
        let url = format!("{}/protected/channel/{}/message", self.base_url, channel_id);
        debug!("POST {url} ({})", content.kind());

        let response = self.client.post(&url).json(content).send().await?;
        ensure_success(response, "send message").await?;
        Ok(())
    }

    async fn fetch_channels(&self) -> Result<Vec<ChannelMetadata>> {
        let url = format!("{}/protected/user/channels", self.base_url);
        debug!("GET {url}");

        let response = self.client.get(&url).send().await?;
        let channels = ensure_success(response, "get channels")
            .await?
            .json()
            .await
            .context("Invalid channel list")?;
        Ok(channels)
    }
}
