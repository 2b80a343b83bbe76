use super::store::StatusStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Liveness probe comparing the newest processed height's update time to now.
///
/// Reports healthy when nothing has been processed yet or the store cannot be
/// read, so a slow start or a store outage never flaps the probe.
#[derive(Clone)]
pub struct LivenessCheck {
    store: Arc<dyn StatusStore>,
    max_lag: Duration,
}

impl LivenessCheck {
    pub fn new(store: Arc<dyn StatusStore>, max_lag: Duration) -> Self {
        Self { store, max_lag }
    }

    pub fn max_lag(&self) -> Duration {
        self.max_lag
    }

    pub async fn is_live(&self) -> bool {
        let latest = match self.store.latest_processed_block().await {
            Ok(Some(latest)) => latest,
            Ok(None) => return true,
            Err(err) => {
                tracing::warn!(error = %err, "liveness check could not read latest processed block");
                return true;
            }
        };

        let lag = Utc::now()
            .signed_duration_since(latest)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if lag > self.max_lag {
            tracing::warn!(
                lag_secs = lag.as_secs(),
                max_lag_secs = self.max_lag.as_secs(),
                "latest processed block is older than the allowed lag"
            );
            return false;
        }
        true
    }
}
