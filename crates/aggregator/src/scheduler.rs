use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A periodic job: every `interval` a unit is sent on `tick` and the worker
/// loop in main does the actual work. Skipped ticks are not replayed; a
/// 12-hour refresh that fell behind should just run once, now.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub interval: Duration,
    pub tick: mpsc::Sender<()>,
}

pub fn start(jobs: Vec<JobSpec>) -> Vec<JoinHandle<()>> {
    jobs.into_iter()
        .map(|job| {
            tokio::spawn(async move {
                let start_at = Instant::now() + job.interval;
                let mut interval = tokio::time::interval_at(start_at, job.interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    interval.tick().await;
                    tracing::debug!(job = %job.name, "scheduler tick");
                    if job.tick.send(()).await.is_err() {
                        break;
                    }
                }
            })
        })
        .collect()
}
