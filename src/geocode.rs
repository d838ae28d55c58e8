use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::cache::AddressCache;
use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::geo::{CacheKey, GeoPoint};
use crate::notify::{NoticeBoard, NoticeKind};
use crate::throttle::ThrottleGate;

pub const PROVIDER_UNAVAILABLE_MESSAGE: &str = "Сервис геокодирования недоступен";
pub const FALLBACK_NOTICE: &str = "Не удалось получить адрес. Пожалуйста, введите его вручную.";

const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("geocoding provider is unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("geocoding provider returned no result")]
    NoResult,
    #[error("geocoding request failed: {0}")]
    Network(String),
    #[error("geocoding provider rate limit exceeded")]
    RateLimited,
    #[error("unexpected geocoding response: {0}")]
    Parse(String),
}

impl GeocodeError {
    /// Only an unavailable provider aborts a resolution; everything else
    /// degrades to the coordinate fallback.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GeocodeError::ProviderUnavailable(_))
    }

    pub fn user_message(&self) -> &'static str {
        if self.is_fatal() {
            PROVIDER_UNAVAILABLE_MESSAGE
        } else {
            FALLBACK_NOTICE
        }
    }
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GeocodeError::Parse(err.to_string())
        } else {
            GeocodeError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    Cache,
    Provider,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub key: CacheKey,
    pub address: String,
    pub source: AddressSource,
}

impl Resolution {
    pub fn is_fallback(&self) -> bool {
        self.source == AddressSource::Fallback
    }
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn reverse(&self, point: GeoPoint) -> Result<String, GeocodeError>;

    async fn search(&self, query: &str) -> Result<GeoPoint, GeocodeError>;
}

#[derive(Clone)]
pub struct GeocoderService {
    inner: Arc<dyn GeocodingProvider>,
}

impl GeocoderService {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        if !config.geocoder_enabled {
            return Ok(Self::unavailable("geocoder disabled by configuration"));
        }
        Ok(Self {
            inner: Arc::new(NominatimClient::new(config)?),
        })
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(UnavailableGeocoder {
                reason: reason.into(),
            }),
        }
    }

    pub fn from_provider(provider: Arc<dyn GeocodingProvider>) -> Self {
        Self { inner: provider }
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    pub async fn reverse(&self, point: GeoPoint) -> Result<String, GeocodeError> {
        self.inner.reverse(point).await
    }

    pub async fn search(&self, query: &str) -> Result<GeoPoint, GeocodeError> {
        self.inner.search(query).await
    }
}

/// Client for a Nominatim-compatible endpoint (`/reverse` and `/search`).
pub struct NominatimClient {
    http: Client,
    base_url: String,
    language: String,
    api_key: Option<SecretString>,
}

impl NominatimClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(config.geocoder_user_agent.clone())
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: config.geocoder_base_url.trim_end_matches('/').to_string(),
            language: config.geocoder_language.clone(),
            api_key: config.geocoder_api_key.clone(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .header("Accept-Language", self.language.as_str())
            .query(&[("format", "jsonv2"), ("accept-language", self.language.as_str())]);
        match &self.api_key {
            Some(key) => request.query(&[("key", key.expose_secret())]),
            None => request,
        }
    }
}

#[async_trait]
impl GeocodingProvider for NominatimClient {
    async fn reverse(&self, point: GeoPoint) -> Result<String, GeocodeError> {
        #[derive(Deserialize)]
        struct Response {
            display_name: Option<String>,
            error: Option<String>,
        }

        let response = self
            .get("reverse")
            .query(&[("lat", point.lat), ("lon", point.lng)])
            .send()
            .await?;
        check_status(response.status())?;

        let parsed: Response = response.json().await?;
        if let Some(error) = parsed.error {
            trace!(%point, error = %error, "reverse lookup found nothing");
            return Err(GeocodeError::NoResult);
        }
        parsed
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or(GeocodeError::NoResult)
    }

    async fn search(&self, query: &str) -> Result<GeoPoint, GeocodeError> {
        #[derive(Deserialize)]
        struct Hit {
            lat: String,
            lon: String,
        }

        let response = self
            .get("search")
            .query(&[("q", query), ("limit", "1")])
            .send()
            .await?;
        check_status(response.status())?;

        let hits: Vec<Hit> = response.json().await?;
        let hit = hits.into_iter().next().ok_or(GeocodeError::NoResult)?;
        let lat = hit
            .lat
            .parse::<f64>()
            .map_err(|_| GeocodeError::Parse(format!("invalid lat {:?}", hit.lat)))?;
        let lng = hit
            .lon
            .parse::<f64>()
            .map_err(|_| GeocodeError::Parse(format!("invalid lon {:?}", hit.lon)))?;
        Ok(GeoPoint::new(lat, lng))
    }
}

fn check_status(status: StatusCode) -> Result<(), GeocodeError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(GeocodeError::RateLimited);
    }
    if !status.is_success() {
        return Err(GeocodeError::Network(format!("provider responded with {status}")));
    }
    Ok(())
}

struct UnavailableGeocoder {
    reason: String,
}

#[async_trait]
impl GeocodingProvider for UnavailableGeocoder {
    fn is_available(&self) -> bool {
        false
    }

    async fn reverse(&self, _point: GeoPoint) -> Result<String, GeocodeError> {
        Err(GeocodeError::ProviderUnavailable(self.reason.clone()))
    }

    async fn search(&self, _query: &str) -> Result<GeoPoint, GeocodeError> {
        Err(GeocodeError::ProviderUnavailable(self.reason.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub cache_hits: usize,
    pub provider_calls: usize,
    pub joined: usize,
    pub fallbacks: usize,
}

type InflightResolution = Shared<BoxFuture<'static, Result<Resolution, GeocodeError>>>;

/// Reverse-geocoding front door: cache first, then one throttled provider call
/// per key, with coordinate fallback on soft failures.
#[derive(Clone)]
pub struct AddressResolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    provider: GeocoderService,
    gate: Arc<ThrottleGate>,
    cache: Mutex<AddressCache>,
    inflight: Mutex<HashMap<CacheKey, InflightResolution>>,
    notices: NoticeBoard,
    cache_hits: AtomicUsize,
    provider_calls: AtomicUsize,
    joined: AtomicUsize,
    fallbacks: AtomicUsize,
}

impl AddressResolver {
    pub fn new(config: &AppConfig, notices: NoticeBoard) -> AppResult<Self> {
        let provider = GeocoderService::new(config)?;
        let gate = Arc::new(ThrottleGate::new(config.min_interval()));
        Ok(Self::with_provider(
            provider,
            gate,
            config.address_cache_capacity,
            notices,
        ))
    }

    pub fn with_provider(
        provider: GeocoderService,
        gate: Arc<ThrottleGate>,
        cache_capacity: usize,
        notices: NoticeBoard,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                provider,
                gate,
                cache: Mutex::new(AddressCache::new(cache_capacity)),
                inflight: Mutex::new(HashMap::new()),
                notices,
                cache_hits: AtomicUsize::new(0),
                provider_calls: AtomicUsize::new(0),
                joined: AtomicUsize::new(0),
                fallbacks: AtomicUsize::new(0),
            }),
        }
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.inner.notices
    }

    pub fn is_available(&self) -> bool {
        self.inner.provider.is_available()
    }

    pub fn cached(&self, point: GeoPoint) -> Option<Resolution> {
        self.lookup(&point.cache_key())
    }

    pub fn cached_address(&self, key: &CacheKey) -> Option<String> {
        self.inner.cache.lock().get(key)
    }

    pub fn cache_len(&self) -> usize {
        self.inner.cache.lock().len()
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            cache_hits: self.inner.cache_hits.load(Ordering::Relaxed),
            provider_calls: self.inner.provider_calls.load(Ordering::Relaxed),
            joined: self.inner.joined.load(Ordering::Relaxed),
            fallbacks: self.inner.fallbacks.load(Ordering::Relaxed),
        }
    }

    pub async fn resolve(&self, point: GeoPoint) -> Result<Resolution, GeocodeError> {
        let key = point.cache_key();
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        let pending = {
            let mut inflight = self.inner.inflight.lock();
            if let Some(hit) = self.lookup(&key) {
                return Ok(hit);
            }
            match inflight.get(&key) {
                Some(existing) => {
                    self.inner.joined.fetch_add(1, Ordering::Relaxed);
                    trace!(%key, "joining in-flight reverse lookup");
                    existing.clone()
                }
                None => {
                    // The lookup runs on its own task so it completes, and
                    // frees the throttle, even if every caller goes away.
                    let this = self.clone();
                    let dispatch_key = key.clone();
                    let task = tokio::spawn(this.dispatch(point, dispatch_key));

                    let inner = Arc::clone(&self.inner);
                    let failed_key = key.clone();
                    let future = task
                        .map(move |joined| {
                            joined.unwrap_or_else(|err| {
                                inner.inflight.lock().remove(&failed_key);
                                Err(GeocodeError::Network(format!(
                                    "reverse lookup task failed: {err}"
                                )))
                            })
                        })
                        .boxed()
                        .shared();
                    inflight.insert(key, future.clone());
                    future
                }
            }
        };
        pending.await
    }

    /// Forward lookup used to place complaint addresses on the map. Shares the
    /// throttle with reverse lookups; nothing is cached.
    pub async fn locate(&self, query: &str) -> Result<GeoPoint, GeocodeError> {
        if !self.inner.provider.is_available() {
            return Err(GeocodeError::ProviderUnavailable(
                PROVIDER_UNAVAILABLE_MESSAGE.to_string(),
            ));
        }
        self.inner.gate.acquire().await;
        self.inner.provider_calls.fetch_add(1, Ordering::Relaxed);
        debug!(query, "dispatching forward geocode");
        self.inner.provider.search(query).await
    }

    fn lookup(&self, key: &CacheKey) -> Option<Resolution> {
        let address = self.inner.cache.lock().get(key)?;
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
        trace!(%key, "address cache hit");
        Some(Resolution {
            key: key.clone(),
            address,
            source: AddressSource::Cache,
        })
    }

    async fn dispatch(self, point: GeoPoint, key: CacheKey) -> Result<Resolution, GeocodeError> {
        // An unavailable provider fails fast and must not spend a throttle slot.
        if self.inner.provider.is_available() {
            self.inner.gate.acquire().await;
            self.inner.provider_calls.fetch_add(1, Ordering::Relaxed);
            debug!(%key, %point, "dispatching reverse geocode");
        }
        let outcome = self.inner.provider.reverse(point).await;

        let result = match outcome {
            Ok(address) => {
                self.inner.cache.lock().put(key.clone(), address.clone());
                Ok(Resolution {
                    key: key.clone(),
                    address,
                    source: AddressSource::Provider,
                })
            }
            Err(err) if err.is_fatal() => {
                warn!(?err, %point, "geocoding provider unavailable");
                self.inner
                    .notices
                    .post(NoticeKind::Error, PROVIDER_UNAVAILABLE_MESSAGE);
                Err(err)
            }
            Err(err) => {
                warn!(?err, %point, "reverse geocoding failed; using coordinate fallback");
                self.inner.fallbacks.fetch_add(1, Ordering::Relaxed);
                self.inner.notices.post(NoticeKind::Warning, FALLBACK_NOTICE);
                Ok(Resolution {
                    key: key.clone(),
                    address: point.fallback_label(),
                    source: AddressSource::Fallback,
                })
            }
        };

        self.inner.inflight.lock().remove(&key);
        result
    }
}
