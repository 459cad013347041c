use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use dooms_clock::error::{ClockError, Result};
use dooms_clock::interfaces::scheduler::ScheduledJob;
use dooms_clock::scheduler::Scheduler;

struct TickJob {
    count: Arc<AtomicU32>,
    fail: bool,
}

#[async_trait]
impl ScheduledJob for TickJob {
    fn name(&self) -> &str {
        "tick"
    }

    fn interval(&self) -> Duration {
        if self.fail {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(10)
        }
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(10)
    }

    async fn run(&self) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClockError::Upstream("down".to_string()));
        }
        Ok(())
    }
}

async fn run_for(fail: bool, millis: u64) -> u32 {
    let count = Arc::new(AtomicU32::new(0));
    let mut scheduler = Scheduler::new();
    scheduler.register_job(Arc::new(TickJob {
        count: count.clone(),
        fail,
    }));
    assert_eq!(scheduler.job_count(), 1);

    scheduler.start();
    assert!(scheduler.is_running());
    tokio::time::sleep(Duration::from_millis(millis)).await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());
    count.load(Ordering::SeqCst)
}

#[tokio::test]
async fn scheduler_runs_jobs_until_stopped() {
    let count = tokio::time::timeout(Duration::from_secs(2), run_for(false, 45))
        .await
        .expect("scheduler test timed out");
    assert!(count >= 2);
}

#[tokio::test]
async fn failed_runs_wait_for_retry_delay() {
    // The interval is a minute, so repeated runs can only come from retries.
    let count = tokio::time::timeout(Duration::from_secs(2), run_for(true, 45))
        .await
        .expect("scheduler test timed out");
    assert!(count >= 2);
}

#[tokio::test]
async fn stop_is_prompt_during_long_sleep() {
    let count = Arc::new(AtomicU32::new(0));
    let mut scheduler = Scheduler::new();
    scheduler.register_job(Arc::new(TickJob {
        count: count.clone(),
        fail: false,
    }));
    scheduler.register_job(Arc::new(SlowJob));
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(5)).await;

    tokio::time::timeout(Duration::from_secs(1), scheduler.stop())
        .await
        .expect("stop should not wait for the next interval");
}

struct SlowJob;

#[async_trait]
impl ScheduledJob for SlowJob {
    fn name(&self) -> &str {
        "slow"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(3600)
    }

    async fn run(&self) -> Result<()> {
        Ok(())
    }
}

struct PanickingJob;

#[async_trait]
impl ScheduledJob for PanickingJob {
    fn name(&self) -> &str {
        "panicking"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(10)
    }

    async fn run(&self) -> Result<()> {
        panic!("job blew up");
    }
}

#[tokio::test]
async fn stop_survives_a_panicked_job() {
    let count = Arc::new(AtomicU32::new(0));
    let mut scheduler = Scheduler::new();
    scheduler.register_job(Arc::new(PanickingJob));
    scheduler.register_job(Arc::new(TickJob {
        count: count.clone(),
        fail: false,
    }));
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(30)).await;

    tokio::time::timeout(Duration::from_secs(1), scheduler.stop())
        .await
        .expect("stop should finish after a job panicked");
    assert!(!scheduler.is_running());
    assert!(count.load(Ordering::SeqCst) >= 1);
}
