use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::trace;

use crate::geo::GeoPoint;
use crate::geocode::{AddressResolver, GeocodeError, Resolution};

/// Trailing-edge debounce. Every `run` supersedes whatever is still waiting
/// out its quiet period; superseded calls return `None` straight away. Work
/// that has already started is never interrupted.
pub struct Debouncer {
    delay: Duration,
    generation: watch::Sender<u64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        let (generation, _) = watch::channel(0);
        Self { delay, generation }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancels the pending call, if any, without scheduling a new one.
    pub fn supersede(&self) -> u64 {
        let mut ticket = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            ticket = *generation;
        });
        ticket
    }

    pub async fn run<F, Fut, T>(&self, work: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.supersede();
        let mut changes = self.generation.subscribe();

        tokio::select! {
            _ = sleep(self.delay) => {}
            _ = changes.changed() => {
                trace!(ticket, "debounced call superseded");
                return None;
            }
        }

        if *self.generation.borrow() != ticket {
            trace!(ticket, "debounced call superseded");
            return None;
        }
        Some(work().await)
    }
}

/// Resolver front end for rapid position input such as map clicks or drags.
pub struct DebouncedResolver {
    resolver: AddressResolver,
    debouncer: Debouncer,
}

impl DebouncedResolver {
    pub fn new(resolver: AddressResolver, delay: Duration) -> Self {
        Self {
            resolver,
            debouncer: Debouncer::new(delay),
        }
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    /// `None` means a later request replaced this one before it was dispatched.
    pub async fn request(&self, point: GeoPoint) -> Option<Result<Resolution, GeocodeError>> {
        if let Some(hit) = self.resolver.cached(point) {
            self.debouncer.supersede();
            return Some(Ok(hit));
        }
        let resolver = &self.resolver;
        self.debouncer.run(|| resolver.resolve(point)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;
    use crate::geocode::{AddressSource, GeocoderService, GeocodingProvider};
    use crate::notify::NoticeBoard;
    use crate::throttle::ThrottleGate;

    #[tokio::test(start_paused = true)]
    async fn runs_after_quiet_period() {
        let debouncer = Debouncer::new(Duration::from_millis(200));
        let start = Instant::now();
        let value = debouncer.run(|| async { 7 }).await;
        assert_eq!(value, Some(7));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_last_call() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(200)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for idx in 0..5 {
            let debouncer = Arc::clone(&debouncer);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                debouncer
                    .run(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        idx
                    })
                    .await
            }));
            sleep(Duration::from_millis(10)).await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results, vec![None, None, None, None, Some(4)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_call_returns_immediately() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(200)));
        let first = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move {
                let result = debouncer.run(|| async { "first" }).await;
                (result, Instant::now())
            })
        };
        sleep(Duration::from_millis(50)).await;
        let superseded_at = Instant::now();
        debouncer.supersede();

        let (result, finished_at) = first.await.unwrap();
        assert!(result.is_none());
        assert_eq!(finished_at, superseded_at);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_calls_both_run() {
        let debouncer = Debouncer::new(Duration::from_millis(200));
        assert_eq!(debouncer.run(|| async { 1 }).await, Some(1));
        assert_eq!(debouncer.run(|| async { 2 }).await, Some(2));
    }

    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<GeoPoint>>,
    }

    #[async_trait]
    impl GeocodingProvider for RecordingProvider {
        async fn reverse(&self, point: GeoPoint) -> Result<String, GeocodeError> {
            self.calls.lock().push(point);
            Ok(format!("address near {}", point.cache_key()))
        }

        async fn search(&self, _query: &str) -> Result<GeoPoint, GeocodeError> {
            Err(GeocodeError::NoResult)
        }
    }

    fn point(idx: u32) -> GeoPoint {
        GeoPoint::new(42.0 + f64::from(idx) * 0.01, 74.0)
    }

    fn debounced_with(provider: Arc<RecordingProvider>) -> DebouncedResolver {
        let resolver = AddressResolver::with_provider(
            GeocoderService::from_provider(provider),
            Arc::new(ThrottleGate::new(Duration::from_millis(1_100))),
            50,
            NoticeBoard::new(),
        );
        DebouncedResolver::new(resolver, Duration::from_millis(200))
    }

    #[tokio::test(start_paused = true)]
    async fn request_burst_dispatches_last_point_once() {
        let provider = Arc::new(RecordingProvider::default());
        let debounced = Arc::new(debounced_with(Arc::clone(&provider)));

        let mut handles = Vec::new();
        for idx in 0..5 {
            let debounced = Arc::clone(&debounced);
            handles.push(tokio::spawn(
                async move { debounced.request(point(idx)).await },
            ));
            sleep(Duration::from_millis(10)).await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert!(results[..4].iter().all(Option::is_none));
        let last = results[4].clone().unwrap().unwrap();
        assert_eq!(last.key, point(4).cache_key());
        assert_eq!(provider.calls.lock().clone(), vec![point(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_request_still_fills_cache() {
        let provider = Arc::new(RecordingProvider::default());
        let debounced = debounced_with(Arc::clone(&provider));
        debounced.resolver().resolve(point(0)).await.unwrap();

        let gave_up =
            tokio::time::timeout(Duration::from_millis(500), debounced.request(point(1))).await;
        assert!(gave_up.is_err());

        sleep(Duration::from_secs(1)).await;
        let hit = debounced.resolver().cached(point(1)).unwrap();
        assert_eq!(hit.address, format!("address near {}", point(1).cache_key()));
        assert_eq!(provider.calls.lock().clone(), vec![point(0), point(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_point_skips_quiet_period() {
        let provider = Arc::new(RecordingProvider::default());
        let debounced = debounced_with(Arc::clone(&provider));
        debounced.request(point(1)).await.unwrap().unwrap();

        let start = Instant::now();
        let hit = debounced.request(point(1)).await.unwrap().unwrap();
        assert_eq!(hit.source, AddressSource::Cache);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(provider.calls.lock().len(), 1);
    }
}
