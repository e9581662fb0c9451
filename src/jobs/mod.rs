//! Background jobs that run on a fixed interval for the lifetime of
//! the server.
mod sweep_streams;

pub use sweep_streams::SweepExpiredStreams;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::AppContext;

#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn interval(&self) -> Duration;

    async fn run_job(&self, context: &AppContext);
}

/// Runs `job` in its own task every `job.interval()`. The first run
/// happens one interval after spawning.
pub fn spawn_periodic_job<J: PeriodicJob>(
    context: Arc<AppContext>,
    job: J,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = job.interval();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            job.run_job(&context).await;
        }
    })
}
