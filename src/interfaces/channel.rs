use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One post as delivered by the upstream channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: i64,
    /// Unix seconds.
    pub posted_at: i64,
    pub text: Option<String>,
    pub image: Option<Vec<u8>>,
}

impl ChannelMessage {
    pub fn arrival_key(&self) -> (i64, i64) {
        (self.posted_at, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// The newest `n` posts.
    Latest(usize),
    /// Every post at or after the given unix timestamp.
    Since(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    pub participants_count: Option<i64>,
}

#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn list_messages(&self, window: FetchWindow) -> Result<Vec<ChannelMessage>>;

    /// `Ok(None)` when the channel has no post with this id.
    async fn get_message(&self, id: i64) -> Result<Option<ChannelMessage>>;

    async fn channel_info(&self) -> Result<ChannelInfo>;
}
