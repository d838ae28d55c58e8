use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::debounce::DebouncedResolver;
use crate::geo::GeoPoint;
use crate::geocode::{AddressResolver, GeocodeError, Resolution, FALLBACK_NOTICE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStage {
    Unresolved,
    Defaulted,
    UserLocated,
}

/// Marker bookkeeping for the address picker. The default position is
/// handed out at most once and never after the device has reported in.
#[derive(Debug, Clone)]
pub struct LocationTracker {
    stage: LocationStage,
    default_position: GeoPoint,
    marker: GeoPoint,
    user_position: Option<GeoPoint>,
    picked: bool,
}

impl LocationTracker {
    pub fn new(default_position: GeoPoint) -> Self {
        Self {
            stage: LocationStage::Unresolved,
            default_position,
            marker: default_position,
            user_position: None,
            picked: false,
        }
    }

    pub fn stage(&self) -> LocationStage {
        self.stage
    }

    pub fn marker(&self) -> GeoPoint {
        self.marker
    }

    pub fn user_position(&self) -> Option<GeoPoint> {
        self.user_position
    }

    /// `Some` only on the `Unresolved → Defaulted` transition.
    pub fn begin_default(&mut self) -> Option<GeoPoint> {
        if self.stage != LocationStage::Unresolved {
            return None;
        }
        self.stage = LocationStage::Defaulted;
        Some(self.default_position)
    }

    /// Records the device position. Returns the point to resolve, unless the
    /// user already picked a spot by hand.
    pub fn locate_user(&mut self, position: GeoPoint) -> Option<GeoPoint> {
        self.stage = LocationStage::UserLocated;
        self.user_position = Some(position);
        if self.picked {
            return None;
        }
        self.marker = position;
        Some(position)
    }

    pub fn pick(&mut self, point: GeoPoint) {
        self.picked = true;
        self.marker = point;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeolocationOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub max_age: Duration,
}

impl GeolocationOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            high_accuracy: config.geolocation_high_accuracy,
            timeout: config.geolocation_timeout(),
            max_age: Duration::from_millis(config.geolocation_max_age_ms),
        }
    }
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(5_000),
            max_age: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePosition {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl DevicePosition {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("geolocation is not supported on this device")]
    Unsupported,
    #[error("geolocation permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("geolocation timed out")]
    Timeout,
}

#[async_trait]
pub trait GeolocationSource: Send + Sync {
    async fn current_position(
        &self,
        options: &GeolocationOptions,
    ) -> Result<DevicePosition, GeolocationError>;
}

/// Source for hosts without a positioning device.
pub struct NoGeolocation;

#[async_trait]
impl GeolocationSource for NoGeolocation {
    async fn current_position(
        &self,
        _options: &GeolocationOptions,
    ) -> Result<DevicePosition, GeolocationError> {
        Err(GeolocationError::Unsupported)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorState {
    pub stage: LocationStage,
    pub marker: GeoPoint,
    pub user_position: Option<GeoPoint>,
    pub address: Option<String>,
    pub error: Option<String>,
}

#[derive(Default)]
struct Outcome {
    address: Option<String>,
    error: Option<String>,
}

/// Map-based address picker: default position first, then the device
/// position, then whatever the user clicks.
pub struct AddressSelector {
    tracker: Mutex<LocationTracker>,
    outcome: Mutex<Outcome>,
    geolocation: Arc<dyn GeolocationSource>,
    options: GeolocationOptions,
    resolver: DebouncedResolver,
    latest: AtomicU64,
}

impl AddressSelector {
    pub fn new(
        resolver: AddressResolver,
        geolocation: Arc<dyn GeolocationSource>,
        config: &AppConfig,
    ) -> Self {
        Self::with_parts(
            DebouncedResolver::new(resolver, config.debounce_delay()),
            geolocation,
            GeolocationOptions::from_config(config),
            config.default_position,
        )
    }

    pub fn with_parts(
        resolver: DebouncedResolver,
        geolocation: Arc<dyn GeolocationSource>,
        options: GeolocationOptions,
        default_position: GeoPoint,
    ) -> Self {
        Self {
            tracker: Mutex::new(LocationTracker::new(default_position)),
            outcome: Mutex::new(Outcome::default()),
            geolocation,
            options,
            resolver,
            latest: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SelectorState {
        let tracker = self.tracker.lock();
        let outcome = self.outcome.lock();
        SelectorState {
            stage: tracker.stage(),
            marker: tracker.marker(),
            user_position: tracker.user_position(),
            address: outcome.address.clone(),
            error: outcome.error.clone(),
        }
    }

    pub fn address(&self) -> Option<String> {
        self.outcome.lock().address.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.outcome.lock().error.clone()
    }

    /// Resolves the default position, then asks the device where it is.
    /// Returns the last resolution that was applied.
    pub async fn initialize(&self) -> Option<Resolution> {
        let mut applied = None;

        let default_position = self.tracker.lock().begin_default();
        if let Some(point) = default_position {
            debug!(%point, "resolving default position");
            applied = self.resolve(point).await;
        }

        if self.tracker.lock().stage() == LocationStage::UserLocated {
            return applied;
        }

        let lookup = self.geolocation.current_position(&self.options);
        let position = match tokio::time::timeout(self.options.timeout, lookup).await {
            Ok(Ok(position)) => position,
            Ok(Err(err)) => {
                debug!(?err, "device position unavailable; keeping default");
                return applied;
            }
            Err(_) => {
                debug!(timeout = ?self.options.timeout, "device position timed out");
                return applied;
            }
        };

        let target = self.tracker.lock().locate_user(position.point());
        info!(point = %position.point(), "device position acquired");
        match target {
            Some(point) => self.resolve(point).await.or(applied),
            None => applied,
        }
    }

    /// Moves the marker and resolves the clicked point. `None` when a later
    /// click superseded this one.
    pub async fn click(&self, point: GeoPoint) -> Option<Resolution> {
        self.tracker.lock().pick(point);
        self.outcome.lock().error = None;
        self.resolve(point).await
    }

    async fn resolve(&self, point: GeoPoint) -> Option<Resolution> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.resolver.request(point).await?;
        if self.latest.load(Ordering::SeqCst) != ticket {
            debug!(%point, "discarding stale resolution");
            return None;
        }
        self.apply(result)
    }

    fn apply(&self, result: Result<Resolution, GeocodeError>) -> Option<Resolution> {
        let mut outcome = self.outcome.lock();
        match result {
            Ok(resolution) => {
                outcome.error = resolution
                    .is_fallback()
                    .then(|| FALLBACK_NOTICE.to_string());
                outcome.address = Some(resolution.address.clone());
                Some(resolution)
            }
            Err(err) => {
                outcome.error = Some(err.user_message().to_string());
                None
            }
        }
    }
}
