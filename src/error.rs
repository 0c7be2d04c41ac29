//! Error types for spatio-live.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GeoError>;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("invalid radius: {0} (must be finite and >= 0)")]
    InvalidRadius(f64),

    #[error("invalid geohash precision: {0} (must be 1..=12)")]
    InvalidPrecision(usize),

    #[error("invalid geohash: {0:?}")]
    InvalidGeohash(String),

    #[error("document {id} has no decodable geo field '{field}'")]
    MissingGeoField { id: String, field: String },

    #[error("subscription failed: {0}")]
    Subscription(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("stream closed before emitting a value")]
    Closed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "toml")]
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl GeoError {
    /// Terminal errors raised by a store subscription.
    pub fn is_subscription(&self) -> bool {
        matches!(self, GeoError::Subscription(_))
    }
}
