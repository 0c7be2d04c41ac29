//! Configuration for geo clients and radius queries.

use crate::compute::geohash::{DEFAULT_PRECISION, MAX_PRECISION};
use crate::error::{GeoError, Result};

/// Client configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Geohash length written by `point()` and assumed for stored documents.
    #[serde(default = "Config::default_precision")]
    pub default_precision: usize,

    /// Slack (km) allowed by the exact distance filter.
    #[serde(default = "Config::default_distance_tolerance_km")]
    pub distance_tolerance_km: f64,

    /// Attach distance/bearing metadata to radius query results.
    #[serde(default = "Config::default_true")]
    pub emit_metadata: bool,

    /// Skip re-emitting a merged radius result identical to the previous one.
    #[serde(default = "Config::default_true")]
    pub suppress_duplicate_emissions: bool,
}

impl Config {
    const fn default_precision() -> usize {
        DEFAULT_PRECISION
    }

    const fn default_distance_tolerance_km() -> f64 {
        1e-9
    }

    const fn default_true() -> bool {
        true
    }

    pub fn with_default_precision(mut self, precision: usize) -> Self {
        assert!(
            (1..=MAX_PRECISION).contains(&precision),
            "Geohash precision must be between 1 and 12"
        );
        self.default_precision = precision;
        self
    }

    pub fn with_distance_tolerance_km(mut self, tolerance: f64) -> Self {
        assert!(
            tolerance.is_finite() && tolerance >= 0.0,
            "Distance tolerance must be finite and non-negative"
        );
        self.distance_tolerance_km = tolerance;
        self
    }

    pub fn with_emit_metadata(mut self, enabled: bool) -> Self {
        self.emit_metadata = enabled;
        self
    }

    pub fn with_suppress_duplicate_emissions(mut self, enabled: bool) -> Self {
        self.suppress_duplicate_emissions = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_PRECISION).contains(&self.default_precision) {
            return Err(GeoError::Config(format!(
                "default_precision must be between 1 and {}, got {}",
                MAX_PRECISION, self.default_precision
            )));
        }

        if !self.distance_tolerance_km.is_finite() || self.distance_tolerance_km < 0.0 {
            return Err(GeoError::Config(format!(
                "distance_tolerance_km must be finite and non-negative, got {}",
                self.distance_tolerance_km
            )));
        }

        if self.distance_tolerance_km > 1.0 {
            log::warn!(
                "distance tolerance of {} km will admit documents well outside the radius",
                self.distance_tolerance_km
            );
        }

        Ok(())
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Config = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| GeoError::Config(e.to_string()))
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_precision: Self::default_precision(),
            distance_tolerance_km: Self::default_distance_tolerance_km(),
            emit_metadata: true,
            suppress_duplicate_emissions: true,
        }
    }
}
