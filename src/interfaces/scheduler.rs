use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    /// Pause after a failed run before the next attempt.
    fn retry_delay(&self) -> Duration {
        self.interval()
    }

    async fn run(&self) -> Result<()>;
}
