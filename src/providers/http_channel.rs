use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::ChannelConfig;
use crate::error::{ClockError, Result};
use crate::interfaces::channel::{ChannelClient, ChannelInfo, ChannelMessage, FetchWindow};

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: i64,
    date: i64,
    #[serde(default)]
    text: Option<String>,
    /// Base64 encoded photo attached to the post.
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessages {
    messages: Vec<WireMessage>,
}

/// Reads a channel through a JSON gateway that fronts the chat network.
pub struct HttpChannelClient {
    base_url: String,
    channel: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpChannelClient {
    pub fn new(config: &ChannelConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_ref()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ClockError::Config("Missing channel gateway base_url".to_string()))?;
        let channel = config.username.trim().trim_start_matches('@').to_string();
        if channel.is_empty() {
            return Err(ClockError::Config("Missing channel username".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|e| ClockError::Http(e.to_string()))?;
        Ok(Self {
            base_url,
            channel,
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    fn channel_url(&self) -> String {
        format!(
            "{}/channels/{}",
            self.base_url,
            urlencoding::encode(&self.channel)
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.client.get(url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        req.send()
            .await
            .map_err(|e| ClockError::Http(e.to_string()))
    }

    fn into_message(wire: WireMessage) -> ChannelMessage {
        let image = wire.image.filter(|v| !v.is_empty()).and_then(|encoded| {
            match general_purpose::STANDARD.decode(encoded.as_bytes()) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    tracing::warn!(message_id = wire.id, error = %err, "Dropping undecodable image");
                    None
                }
            }
        });
        ChannelMessage {
            id: wire.id,
            posted_at: wire.date,
            text: wire.text,
            image,
        }
    }
}

fn ensure_success(response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ClockError::Upstream(format!(
            "channel gateway returned {status}"
        )))
    }
}

#[async_trait]
impl ChannelClient for HttpChannelClient {
    async fn list_messages(&self, window: FetchWindow) -> Result<Vec<ChannelMessage>> {
        let url = format!("{}/messages", self.channel_url());
        let query: Vec<(&str, String)> = match window {
            FetchWindow::Latest(limit) => vec![("limit", limit.max(1).to_string())],
            FetchWindow::Since(since) => vec![("since", since.to_string())],
        };
        let response = self.send(self.get(&url).query(&query)).await?;
        ensure_success(&response)?;
        let body: WireMessages = response
            .json()
            .await
            .map_err(|e| ClockError::Upstream(e.to_string()))?;

        let messages: Vec<ChannelMessage> =
            body.messages.into_iter().map(Self::into_message).collect();
        tracing::debug!(
            channel = %self.channel,
            count = messages.len(),
            "Retrieved channel messages"
        );
        Ok(messages)
    }

    async fn get_message(&self, id: i64) -> Result<Option<ChannelMessage>> {
        let url = format!("{}/messages/{id}", self.channel_url());
        let response = self.send(self.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        ensure_success(&response)?;
        let wire: WireMessage = response
            .json()
            .await
            .map_err(|e| ClockError::Upstream(e.to_string()))?;
        Ok(Some(Self::into_message(wire)))
    }

    async fn channel_info(&self) -> Result<ChannelInfo> {
        let response = self.send(self.get(&self.channel_url())).await?;
        ensure_success(&response)?;
        response
            .json()
            .await
            .map_err(|e| ClockError::Upstream(e.to_string()))
    }
}
