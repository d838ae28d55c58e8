use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Minimum-interval gate in front of the geocoding provider.
///
/// Waiters are served in call order (the tokio mutex is fair), and every grant
/// is spaced from the previous grant rather than from the waiter's arrival, so
/// a burst of any size is flattened to one call per interval.
pub struct ThrottleGate {
    min_interval: Duration,
    last_grant: AsyncMutex<Option<Instant>>,
}

impl ThrottleGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_grant: AsyncMutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub async fn acquire(&self) {
        let mut guard = self.last_grant.lock().await;
        if let Some(prev) = *guard {
            let ready_at = prev + self.min_interval;
            if Instant::now() < ready_at {
                trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "throttling geocoder call"
                );
                sleep_until(ready_at).await;
            }
        }
        *guard = Some(Instant::now());
    }
}
