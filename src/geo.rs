use std::fmt;

use serde::{Deserialize, Serialize};

const KEY_PRECISION: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn cache_key(&self) -> CacheKey {
        normalize(self.lat, self.lng)
    }

    /// Coordinate string shown in place of an address the provider could not supply.
    pub fn fallback_label(&self) -> String {
        format!("{:.6}, {:.6}", self.lat, self.lng)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lng)
    }
}

/// Rounded "lat,lng" string used to deduplicate near-identical points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

pub fn normalize(lat: f64, lng: f64) -> CacheKey {
    CacheKey(format!("{:.3},{:.3}", round_coordinate(lat), round_coordinate(lng)))
}

// f64::round is half-away-from-zero; adding 0.0 folds -0.0 into 0.0.
fn round_coordinate(value: f64) -> f64 {
    (value * KEY_PRECISION).round() / KEY_PRECISION + 0.0
}
