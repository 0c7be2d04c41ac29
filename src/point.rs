//! Immutable geographic point with derived geohash data.

use crate::compute::distance::{bearing_deg, haversine_km};
use crate::compute::geohash::{self, DEFAULT_PRECISION};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Latitude/longitude pair as persisted inside a geo field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

/// The exact shape stored on a document under a geo-indexed field:
/// `{ "geohash": "...", "geopoint": { "latitude": .., "longitude": .. } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFieldData {
    pub geohash: String,
    pub geopoint: LatLng,
}

impl GeoFieldData {
    /// JSON value to store under the document's geo field.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A validated geographic point.
///
/// The hash and its eight neighbors are computed once on construction; the
/// point is never mutated afterwards.
///
/// # Examples
///
/// ```
/// use spatio_live::GeoPoint;
///
/// let p = GeoPoint::new(40.5, -80.0)?;
/// assert_eq!(p.hash().len(), 9);
///
/// let d = p.distance(-20.0, 30.0);
/// assert!((d - 13099.698).abs() < 0.01);
/// # Ok::<(), spatio_live::GeoError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
    hash: String,
    neighbors: [String; 8],
}

impl GeoPoint {
    /// Create a point hashed at the default precision (9 characters).
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        Self::with_precision(latitude, longitude, DEFAULT_PRECISION)
    }

    /// Create a point hashed at `precision` characters.
    pub fn with_precision(latitude: f64, longitude: f64, precision: usize) -> Result<Self> {
        let hash = geohash::encode(latitude, longitude, precision)?;
        let neighbors = geohash::neighbors(&hash)?;

        Ok(Self {
            latitude,
            longitude,
            hash,
            neighbors,
        })
    }

    /// Decode a persisted geo field value.
    ///
    /// Prefers the `geopoint` object; falls back to the center of the
    /// `geohash` cell when only the hash is present.
    pub fn from_field_value(value: &Value) -> Option<Self> {
        if let Some(geopoint) = value.get("geopoint")
            && let (Some(lat), Some(lon)) = (
                geopoint.get("latitude").and_then(Value::as_f64),
                geopoint.get("longitude").and_then(Value::as_f64),
            )
        {
            return Self::new(lat, lon).ok();
        }

        let hash = value.get("geohash").and_then(Value::as_str)?;
        let (lat, lon) = geohash::decode(hash).ok()?;
        Self::new(lat, lon).ok()
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Geohash at the precision the point was built with.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Geohash at an arbitrary precision.
    pub fn hash_with_precision(&self, precision: usize) -> Result<String> {
        geohash::encode(self.latitude, self.longitude, precision)
    }

    pub fn precision(&self) -> usize {
        self.hash.len()
    }

    /// Neighbor hashes in N, NE, E, SE, S, SW, W, NW order.
    pub fn neighbors(&self) -> &[String; 8] {
        &self.neighbors
    }

    /// Field value to persist on a document.
    pub fn data(&self) -> GeoFieldData {
        GeoFieldData {
            geohash: self.hash.clone(),
            geopoint: LatLng {
                latitude: self.latitude,
                longitude: self.longitude,
            },
        }
    }

    /// Haversine distance in kilometers to `(latitude, longitude)`.
    pub fn distance(&self, latitude: f64, longitude: f64) -> f64 {
        haversine_km(self.latitude, self.longitude, latitude, longitude)
    }

    /// Initial bearing in degrees to `(latitude, longitude)`, in `(-180, 180]`.
    pub fn bearing(&self, latitude: f64, longitude: f64) -> f64 {
        bearing_deg(self.latitude, self.longitude, latitude, longitude)
    }

    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        self.distance(other.latitude, other.longitude)
    }

    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        self.bearing(other.latitude, other.longitude)
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(point: GeoPoint) -> Self {
        geo::Point::new(point.longitude, point.latitude)
    }
}

impl From<&GeoPoint> for geo::Point<f64> {
    fn from(point: &GeoPoint) -> Self {
        geo::Point::new(point.longitude, point.latitude)
    }
}
