use thiserror::Error;

use crate::geocode::GeocodeError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("backend responded with {status}: {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Geocode(#[from] GeocodeError),
    #[error("{0}")]
    Config(String),
    #[error("invalid input: {0}")]
    Validation(String),
}
