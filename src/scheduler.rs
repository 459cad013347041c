use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::interfaces::scheduler::ScheduledJob;

/// Runs each registered job on its own tokio task until [`Scheduler::stop`].
pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            handles: Vec::new(),
            shutdown_tx,
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn ScheduledJob>) {
        self.jobs.push(job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }

    pub fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("Scheduler already running");
            return;
        }
        self.handles.clear();
        self.shutdown_tx.send_replace(false);
        for job in &self.jobs {
            let job = job.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            tracing::info!(job = job.name(), interval = ?job.interval(), "Starting scheduled job");
            self.handles.push(tokio::spawn(async move {
                loop {
                    let pause = match job.run().await {
                        Ok(()) => job.interval(),
                        Err(err) => {
                            tracing::warn!(job = job.name(), error = %err, "Scheduled job failed");
                            job.retry_delay()
                        }
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
                tracing::info!(job = job.name(), "Scheduled job stopped");
            }));
        }
    }

    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "Scheduled job task ended abnormally");
            }
        }
    }
}
