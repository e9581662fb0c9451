use std::time::Duration;

use async_trait::async_trait;

use super::PeriodicJob;
use crate::core::AppContext;

/// Releases stream state left behind by turns that never finished.
#[derive(Debug)]
pub struct SweepExpiredStreams;

#[async_trait]
impl PeriodicJob for SweepExpiredStreams {
    fn interval(&self) -> Duration {
        // Every minute
        Duration::from_secs(60)
    }

    async fn run_job(&self, context: &AppContext) {
        let swept = context.chat.sweep_expired();
        if swept > 0 {
            tracing::info!("Swept {} expired stream(s)", swept);
        }
    }
}
