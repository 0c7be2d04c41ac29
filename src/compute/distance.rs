//! Great-circle distance and initial bearing.
//!
//! Distances are computed with the `geo` crate's haversine implementation on
//! the mean Earth radius and reported in kilometers.

use geo::{Distance, Haversine, Point};

/// Mean Earth radius in kilometers (same radius `geo::Haversine` uses).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Kilometers spanned by one degree of latitude.
pub const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// Haversine distance in kilometers between two `(lat, lon)` coordinates.
///
/// ```
/// use spatio_live::compute::distance::haversine_km;
///
/// let d = haversine_km(40.5, -80.0, 40.49100679636276, -80.0);
/// assert!((d - 1.0).abs() < 1e-3);
/// ```
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let from = Point::new(lon1, lat1);
    let to = Point::new(lon2, lat2);
    Haversine.distance(from, to) / 1000.0
}

/// Initial bearing (forward azimuth) in degrees from the first coordinate to
/// the second.
///
/// The result lies in `(-180, 180]`: 0 is due north, 90 due east and west is
/// negative.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    let bearing = y.atan2(x).to_degrees();
    if bearing <= -180.0 { bearing + 360.0 } else { bearing }
}
