#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use dooms_clock::error::{ClockError, Result};
use dooms_clock::interfaces::channel::{ChannelClient, ChannelInfo, ChannelMessage, FetchWindow};
use dooms_clock::services::clock::ClockService;
use dooms_clock::updates::UpdateStore;

/// In-memory channel whose posts can be swapped between calls.
pub struct FakeChannel {
    messages: Mutex<Vec<ChannelMessage>>,
    failing: AtomicBool,
    pub list_calls: AtomicUsize,
}

impl FakeChannel {
    pub fn new(messages: Vec<ChannelMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
            failing: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub async fn set_messages(&self, messages: Vec<ChannelMessage>) {
        *self.messages.lock().await = messages;
    }

    pub async fn push(&self, message: ChannelMessage) {
        self.messages.lock().await.push(message);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClockError::Upstream("channel unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelClient for FakeChannel {
    async fn list_messages(&self, window: FetchWindow) -> Result<Vec<ChannelMessage>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut messages = self.messages.lock().await.clone();
        messages.sort_by_key(|m| std::cmp::Reverse(m.arrival_key()));
        Ok(match window {
            FetchWindow::Latest(limit) => messages.into_iter().take(limit).collect(),
            FetchWindow::Since(since) => messages
                .into_iter()
                .filter(|m| m.posted_at >= since)
                .collect(),
        })
    }

    async fn get_message(&self, id: i64) -> Result<Option<ChannelMessage>> {
        self.check()?;
        Ok(self
            .messages
            .lock()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn channel_info(&self) -> Result<ChannelInfo> {
        self.check()?;
        Ok(ChannelInfo {
            id: 1,
            title: "Dooms Deal Clock".to_string(),
            username: Some("dooms_deal_clock".to_string()),
            participants_count: Some(42),
        })
    }
}

pub fn clock_post(id: i64, posted_at: i64, time: &str) -> ChannelMessage {
    ChannelMessage {
        id,
        posted_at,
        text: Some(format!(
            "{time} (−5) | 235 секунд (+5)\n\nUpdate number {id} for the clock"
        )),
        image: None,
    }
}

pub fn text_post(id: i64, posted_at: i64, text: &str) -> ChannelMessage {
    ChannelMessage {
        id,
        posted_at,
        text: Some(text.to_string()),
        image: None,
    }
}

pub async fn temp_store() -> (NamedTempFile, Arc<UpdateStore>) {
    let db = NamedTempFile::new().unwrap();
    let store = UpdateStore::new(db.path().to_str().unwrap()).await.unwrap();
    (db, Arc::new(store))
}

pub async fn service_with(
    messages: Vec<ChannelMessage>,
) -> (NamedTempFile, Arc<FakeChannel>, Arc<ClockService>) {
    let (db, store) = temp_store().await;
    let channel = Arc::new(FakeChannel::new(messages));
    let service = Arc::new(ClockService::new(channel.clone(), store, 5));
    (db, channel, service)
}
