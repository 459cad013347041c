use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use crate::error::{ClockError, Result};
use crate::interfaces::channel::{ChannelClient, ChannelMessage, FetchWindow};
use crate::services::parser::{self, ParseOutcome};
use crate::updates::{ClockUpdate, UpdateDraft, UpdateStore};

pub const MAX_HISTORY_LIMIT: i64 = 100;
pub const MAX_PERIOD_DAYS: i64 = 365;
const SECONDS_PER_DAY: i64 = 86_400;

/// Diagnostic record of one parse, kept in reports and logs only.
#[derive(Debug, Clone, Serialize)]
pub struct ParseAttempt {
    pub message_id: i64,
    pub parsed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub updates_count: usize,
    pub skipped: usize,
    pub activated: Option<i64>,
    pub attempts: Vec<ParseAttempt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub message_id: i64,
    pub updates_count: usize,
    pub activated: bool,
}

pub struct ClockService {
    client: Arc<dyn ChannelClient>,
    store: Arc<UpdateStore>,
    fetch_limit: usize,
}

impl ClockService {
    pub fn new(client: Arc<dyn ChannelClient>, store: Arc<UpdateStore>, fetch_limit: usize) -> Self {
        Self {
            client,
            store,
            fetch_limit: fetch_limit.max(1),
        }
    }

    pub fn store(&self) -> &Arc<UpdateStore> {
        &self.store
    }

    pub fn client(&self) -> &Arc<dyn ChannelClient> {
        &self.client
    }

    pub async fn fetch_latest(&self) -> Result<FetchReport> {
        self.fetch(FetchWindow::Latest(self.fetch_limit)).await
    }

    pub async fn fetch_period(&self, days: i64) -> Result<FetchReport> {
        if !(1..=MAX_PERIOD_DAYS).contains(&days) {
            return Err(ClockError::InvalidRequest(format!(
                "days must be between 1 and {MAX_PERIOD_DAYS}"
            )));
        }
        let since = now_ts() - days * SECONDS_PER_DAY;
        self.fetch(FetchWindow::Since(since)).await
    }

    /// Pulls the window from the channel, stores every new parsed post and
    /// promotes the newest one inserted.
    pub async fn fetch(&self, window: FetchWindow) -> Result<FetchReport> {
        let mut messages = self.client.list_messages(window).await.map_err(|err| {
            tracing::warn!(error = %err, ?window, "Channel fetch failed");
            err
        })?;
        messages.sort_by_key(ChannelMessage::arrival_key);

        let mut report = FetchReport::default();
        let mut newest: Option<(i64, i64)> = None;

        for message in messages {
            let Some(draft) = self.prepare(&message, &mut report.attempts) else {
                report.skipped += 1;
                continue;
            };

            if self.store.insert_if_absent(&draft).await? {
                report.updates_count += 1;
                tracing::debug!(
                    message_id = draft.message_id,
                    time = %draft.reading.time,
                    "Stored clock update"
                );
                let key = message.arrival_key();
                if newest.map_or(true, |current| key > current) {
                    newest = Some(key);
                }
            } else {
                report.skipped += 1;
            }
        }

        if let Some((_, message_id)) = newest {
            if self.store.promote_if_newer(message_id).await? {
                report.activated = Some(message_id);
            }
        }

        tracing::info!(
            updates = report.updates_count,
            skipped = report.skipped,
            activated = ?report.activated,
            "Fetch finished"
        );
        Ok(report)
    }

    /// Re-reads one post and rewrites its stored row. Activation follows the
    /// same arrival rule as [`ClockService::fetch`], so an older post never
    /// takes the flag from a newer one.
    pub async fn reload(&self, message_id: i64) -> Result<ReloadReport> {
        if message_id <= 0 {
            return Err(ClockError::InvalidRequest(
                "message_id must be a positive integer".to_string(),
            ));
        }
        let message = self
            .client
            .get_message(message_id)
            .await?
            .ok_or_else(|| ClockError::NotFound(format!("message {message_id} not found")))?;

        let mut attempts = Vec::new();
        let Some(draft) = self.prepare(&message, &mut attempts) else {
            let reason = attempts
                .pop()
                .and_then(|attempt| attempt.error)
                .unwrap_or_else(|| "message could not be parsed".to_string());
            return Err(ClockError::Unprocessable(reason));
        };

        self.store.upsert(&draft).await?;
        let activated = self.store.promote_if_newer(message_id).await?;
        tracing::info!(message_id, activated, "Reloaded message");
        Ok(ReloadReport {
            message_id,
            updates_count: 1,
            activated,
        })
    }

    pub async fn reset(&self) -> Result<usize> {
        let deleted = self.store.clear().await?;
        tracing::info!(deleted, "Cleared clock updates");
        Ok(deleted)
    }

    pub async fn latest(&self) -> Result<Option<ClockUpdate>> {
        self.store.active().await
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<ClockUpdate>> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(ClockError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}"
            )));
        }
        self.store.recent(limit as usize).await
    }

    pub async fn total_count(&self) -> Result<i64> {
        self.store.count().await
    }

    fn prepare(
        &self,
        message: &ChannelMessage,
        attempts: &mut Vec<ParseAttempt>,
    ) -> Option<UpdateDraft> {
        let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            attempts.push(ParseAttempt {
                message_id: message.id,
                parsed: false,
                error: Some("message has no text".to_string()),
            });
            return None;
        };

        match parser::parse(text) {
            ParseOutcome::Parsed(reading) => {
                attempts.push(ParseAttempt {
                    message_id: message.id,
                    parsed: true,
                    error: None,
                });
                Some(UpdateDraft {
                    message_id: message.id,
                    posted_at: message.posted_at,
                    reading,
                    content: text.to_string(),
                    image_data: message
                        .image
                        .as_ref()
                        .map(|bytes| general_purpose::STANDARD.encode(bytes)),
                })
            }
            ParseOutcome::Unparsed { reason, .. } => {
                tracing::debug!(message_id = message.id, %reason, "Skipping unparsed message");
                attempts.push(ParseAttempt {
                    message_id: message.id,
                    parsed: false,
                    error: Some(reason),
                });
                None
            }
        }
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
