use serde::Serialize;
use tracing::info;

use crate::config::PublicAppConfig;
use crate::errors::{AppError, AppResult};
use crate::geo::GeoPoint;
use crate::geocode::{Resolution, ResolverStats};
use crate::notify::Notice;
use crate::IntakeState;

#[derive(Debug, Serialize)]
pub struct IntakeHealth {
    pub config: PublicAppConfig,
    pub geocoder_available: bool,
    pub cached_addresses: usize,
    pub resolver: ResolverStats,
    pub complaints_loaded: usize,
    pub notice: Option<Notice>,
}

impl IntakeHealth {
    pub fn new(
        config: PublicAppConfig,
        geocoder_available: bool,
        cached_addresses: usize,
        resolver: ResolverStats,
        complaints_loaded: usize,
        notice: Option<Notice>,
    ) -> Self {
        Self {
            config,
            geocoder_available,
            cached_addresses,
            resolver,
            complaints_loaded,
            notice,
        }
    }
}

pub fn checked_point(lat: f64, lng: f64) -> AppResult<GeoPoint> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(AppError::Validation(format!("latitude {lat} out of range")));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(AppError::Validation(format!("longitude {lng} out of range")));
    }
    Ok(GeoPoint::new(lat, lng))
}

pub async fn resolve_address(state: &IntakeState, lat: f64, lng: f64) -> AppResult<Resolution> {
    let point = checked_point(lat, lng)?;
    let resolution = state.resolver().resolve(point).await?;
    info!(key = %resolution.key, source = ?resolution.source, "address resolved");
    Ok(resolution)
}
