//! Validation for coordinates, radii and geohash precision.

use crate::compute::geohash::MAX_PRECISION;
use crate::error::{GeoError, Result};

/// Validates a latitude/longitude pair.
///
/// Latitude: [-90.0, 90.0], Longitude: [-180.0, 180.0]. Values are never clamped.
///
/// # Examples
///
/// ```
/// use spatio_live::compute::validation::validate_coordinate;
///
/// assert!(validate_coordinate(40.7128, -74.0060).is_ok());
/// assert!(validate_coordinate(95.0, -74.0).is_err());
/// assert!(validate_coordinate(40.0, 200.0).is_err());
/// ```
pub fn validate_coordinate(latitude: f64, longitude: f64) -> Result<()> {
    let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
    let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);

    if !lat_ok || !lon_ok {
        return Err(GeoError::InvalidCoordinate {
            latitude,
            longitude,
        });
    }

    Ok(())
}

/// Validates a search radius in kilometers. Zero is allowed.
///
/// ```
/// use spatio_live::compute::validation::validate_radius;
///
/// assert!(validate_radius(0.0).is_ok());
/// assert!(validate_radius(-1.0).is_err());
/// ```
pub fn validate_radius(radius_km: f64) -> Result<()> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(GeoError::InvalidRadius(radius_km));
    }
    Ok(())
}

/// Validates a geohash precision (1..=12 characters).
pub fn validate_precision(precision: usize) -> Result<()> {
    if !(1..=MAX_PRECISION).contains(&precision) {
        return Err(GeoError::InvalidPrecision(precision));
    }
    Ok(())
}
