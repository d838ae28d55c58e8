use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::geo::GeoPoint;

const DEFAULT_GEOCODER_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:8000/";
const DEFAULT_MIN_INTERVAL_MS: u64 = 1_100;
const DEFAULT_DEBOUNCE_MS: u64 = 200;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: usize = 50;
const DEFAULT_LAT: f64 = 42.8746;
const DEFAULT_LNG: f64 = 74.5698;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub geocoder_base_url: String,
    pub geocoder_enabled: bool,
    pub geocoder_language: String,
    pub geocoder_user_agent: String,
    pub geocoder_api_key: Option<SecretString>,
    pub geocoder_region_suffix: String,
    pub geocode_min_interval_ms: u64,
    pub geocode_debounce_ms: u64,
    pub address_cache_capacity: usize,
    pub backend_base_url: String,
    pub search_debounce_ms: u64,
    pub geolocation_timeout_ms: u64,
    pub geolocation_max_age_ms: u64,
    pub geolocation_high_accuracy: bool,
    pub default_position: GeoPoint,
    pub overlay_min_score: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub geocoder_base_url: String,
    pub geocoder_enabled: bool,
    pub geocoder_language: String,
    pub geocode_min_interval_ms: u64,
    pub geocode_debounce_ms: u64,
    pub address_cache_capacity: usize,
    pub backend_base_url: String,
    pub search_debounce_ms: u64,
    pub default_position: GeoPoint,
    pub overlay_min_score: u8,
    pub has_geocoder_api_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            geocoder_base_url: env::var("GEOCODER_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEOCODER_BASE_URL.to_string()),
            geocoder_enabled: parse_bool("GEOCODER_ENABLED", true),
            geocoder_language: env::var("GEOCODER_LANGUAGE").unwrap_or_else(|_| "ru".to_string()),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|_| format!("complaint-intake/{}", env!("CARGO_PKG_VERSION"))),
            geocoder_api_key: env::var("GEOCODER_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            geocoder_region_suffix: env::var("GEOCODER_REGION_SUFFIX")
                .unwrap_or_else(|_| "Кыргызстан".to_string()),
            geocode_min_interval_ms: parse_u64("GEOCODE_MIN_INTERVAL_MS", DEFAULT_MIN_INTERVAL_MS),
            geocode_debounce_ms: parse_u64("GEOCODE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS),
            address_cache_capacity: parse_usize("ADDRESS_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)
                .max(1),
            backend_base_url: env::var("BACKEND_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BACKEND_BASE_URL.to_string()),
            search_debounce_ms: parse_u64("SEARCH_DEBOUNCE_MS", DEFAULT_SEARCH_DEBOUNCE_MS),
            geolocation_timeout_ms: parse_u64("GEOLOCATION_TIMEOUT_MS", 5_000),
            geolocation_max_age_ms: parse_u64("GEOLOCATION_MAX_AGE_MS", 0),
            geolocation_high_accuracy: parse_bool("GEOLOCATION_HIGH_ACCURACY", true),
            default_position: GeoPoint::new(
                parse_f64("DEFAULT_LAT", DEFAULT_LAT),
                parse_f64("DEFAULT_LNG", DEFAULT_LNG),
            ),
            overlay_min_score: parse_u32("OVERLAY_MIN_SCORE", 4).min(10) as u8,
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            geocoder_base_url: self.geocoder_base_url.clone(),
            geocoder_enabled: self.geocoder_enabled,
            geocoder_language: self.geocoder_language.clone(),
            geocode_min_interval_ms: self.geocode_min_interval_ms,
            geocode_debounce_ms: self.geocode_debounce_ms,
            address_cache_capacity: self.address_cache_capacity,
            backend_base_url: self.backend_base_url.clone(),
            search_debounce_ms: self.search_debounce_ms,
            default_position: self.default_position,
            overlay_min_score: self.overlay_min_score,
            has_geocoder_api_key: self.geocoder_api_key.is_some(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        for (key, url) in [
            ("GEOCODER_BASE_URL", &self.geocoder_base_url),
            ("BACKEND_BASE_URL", &self.backend_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AppError::Config(format!("{key} must be an http(s) URL, got {url:?}")));
            }
        }
        let GeoPoint { lat, lng } = self.default_position;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::Config(format!(
                "default position {} is outside valid coordinates",
                self.default_position
            )));
        }
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.geocode_min_interval_ms)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.geocode_debounce_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation_timeout_ms)
    }
}

impl Default for AppConfig {
    /// Built-in defaults, without consulting the environment.
    fn default() -> Self {
        Self {
            geocoder_base_url: DEFAULT_GEOCODER_BASE_URL.to_string(),
            geocoder_enabled: true,
            geocoder_language: "ru".to_string(),
            geocoder_user_agent: format!("complaint-intake/{}", env!("CARGO_PKG_VERSION")),
            geocoder_api_key: None,
            geocoder_region_suffix: "Кыргызстан".to_string(),
            geocode_min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            geocode_debounce_ms: DEFAULT_DEBOUNCE_MS,
            address_cache_capacity: DEFAULT_CACHE_CAPACITY,
            backend_base_url: DEFAULT_BACKEND_BASE_URL.to_string(),
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            geolocation_timeout_ms: 5_000,
            geolocation_max_age_ms: 0,
            geolocation_high_accuracy: true,
            default_position: GeoPoint::new(DEFAULT_LAT, DEFAULT_LNG),
            overlay_min_score: 4,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
