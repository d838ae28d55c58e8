mod analytics;
mod api;
mod cache;
mod commands;
mod complaint;
mod config;
mod debounce;
mod errors;
mod geo;
mod geocode;
mod location;
mod notify;
mod overlay;
mod pipeline;
mod store;
mod throttle;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use analytics::{
    category_breakdown, filter_by_range, yearly_counts, CategoryCount, DateRange, YearCount,
};
pub use api::{ComplaintBackend, ComplaintsApi, ListQuery};
pub use cache::{AddressCache, DEFAULT_CAPACITY};
pub use commands::{checked_point, resolve_address, IntakeHealth};
pub use complaint::{
    decode_category, decode_status, encode_category, encode_status, parse_timestamp, Category,
    Complaint, ComplaintId, ComplaintPatch, ComplaintStatus, NewComplaint, MAX_SERIOUSNESS,
};
pub use config::{AppConfig, PublicAppConfig};
pub use debounce::{DebouncedResolver, Debouncer};
pub use errors::{AppError, AppResult};
pub use geo::{normalize, CacheKey, GeoPoint};
pub use geocode::{
    AddressResolver, AddressSource, GeocodeError, GeocoderService, GeocodingProvider,
    NominatimClient, Resolution, ResolverStats, FALLBACK_NOTICE, PROVIDER_UNAVAILABLE_MESSAGE,
};
pub use location::{
    AddressSelector, DevicePosition, GeolocationError, GeolocationOptions, GeolocationSource,
    LocationStage, LocationTracker, NoGeolocation, SelectorState,
};
pub use notify::{Notice, NoticeBoard, NoticeKind};
pub use overlay::{dedupe, MapOverlay, OverlayProgress, PlottedComplaint, ProgressObserver};
pub use pipeline::{
    derive, derive_by, CategoryFilter, FilterSortSpec, SortDirection, SortKey, StatusFilter,
};
pub use store::ComplaintStore;
pub use throttle::ThrottleGate;

/// Wires the resolver, complaint store and map overlay around one notice
/// board and one geocoding throttle.
pub struct IntakeState {
    config: AppConfig,
    notices: NoticeBoard,
    resolver: AddressResolver,
    store: ComplaintStore,
    overlay: MapOverlay,
}

impl IntakeState {
    pub fn from_env() -> AppResult<Self> {
        init_tracing();
        Self::initialize(AppConfig::from_env())
    }

    pub fn initialize(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let notices = NoticeBoard::new();
        let resolver = AddressResolver::new(&config, notices.clone())?;
        let backend: Arc<dyn ComplaintBackend> = Arc::new(ComplaintsApi::new(&config)?);
        Ok(Self::assemble(config, notices, resolver, backend))
    }

    /// Same wiring over caller-supplied collaborators.
    pub fn assemble(
        config: AppConfig,
        notices: NoticeBoard,
        resolver: AddressResolver,
        backend: Arc<dyn ComplaintBackend>,
    ) -> Self {
        let store = ComplaintStore::new(backend, notices.clone(), config.search_debounce());
        let overlay = MapOverlay::new(resolver.clone(), &config);
        info!(
            geocoder = %config.geocoder_base_url,
            available = resolver.is_available(),
            "complaint intake ready"
        );
        Self {
            config,
            notices,
            resolver,
            store,
            overlay,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    pub fn store(&self) -> &ComplaintStore {
        &self.store
    }

    pub fn overlay(&self) -> &MapOverlay {
        &self.overlay
    }

    /// A fresh picker sharing this state's cache and throttle.
    pub fn address_selector(&self, geolocation: Arc<dyn GeolocationSource>) -> AddressSelector {
        AddressSelector::new(self.resolver.clone(), geolocation, &self.config)
    }

    pub fn health(&self) -> IntakeHealth {
        IntakeHealth::new(
            self.config.public_profile(),
            self.resolver.is_available(),
            self.resolver.cache_len(),
            self.resolver.stats(),
            self.store.snapshot().len(),
            self.notices.current(),
        )
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,complaint_intake_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
