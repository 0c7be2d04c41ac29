//! Geohash encoding on top of the `geohash` crate.
//!
//! Encoding and decoding go through `geohash`. Neighbors are computed here by
//! stepping a cell's interval pair and re-encoding, so that longitude wraps
//! across the antimeridian and latitude clamps at the poles instead of
//! failing.

use crate::compute::validation::{validate_coordinate, validate_precision};
use crate::error::{GeoError, Result};
use ::geohash::Coord;

/// Base-32 alphabet used by geohash strings.
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Default number of characters produced for a point's hash.
pub const DEFAULT_PRECISION: usize = 9;

/// Longest supported hash.
pub const MAX_PRECISION: usize = 12;

/// A closed numeric interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn mid(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    #[inline]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// The latitude/longitude interval pair covered by one geohash cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    pub lat: Interval,
    pub lon: Interval,
}

impl CellBounds {
    /// Cell center as `(latitude, longitude)`.
    pub fn center(&self) -> (f64, f64) {
        (self.lat.mid(), self.lon.mid())
    }

    pub fn lat_span(&self) -> f64 {
        self.lat.span()
    }

    pub fn lon_span(&self) -> f64 {
        self.lon.span()
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.lat.min..=self.lat.max).contains(&latitude)
            && (self.lon.min..=self.lon.max).contains(&longitude)
    }
}

/// Compass direction of an adjacent cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// All directions in clockwise order starting at north.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Unit step as `(lat_step, lon_step)`.
    pub const fn offset(self) -> (i8, i8) {
        match self {
            Direction::North => (1, 0),
            Direction::NorthEast => (1, 1),
            Direction::East => (0, 1),
            Direction::SouthEast => (-1, 1),
            Direction::South => (-1, 0),
            Direction::SouthWest => (-1, -1),
            Direction::West => (0, -1),
            Direction::NorthWest => (1, -1),
        }
    }
}

/// Encode a coordinate into a geohash of `precision` characters.
///
/// # Examples
///
/// ```
/// use spatio_live::compute::geohash::encode;
///
/// let hash = encode(57.64911, 10.40744, 11).unwrap();
/// assert_eq!(hash, "u4pruydqqvj");
/// ```
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> Result<String> {
    validate_coordinate(latitude, longitude)?;
    validate_precision(precision)?;

    let coord = Coord {
        x: longitude,
        y: latitude,
    };
    ::geohash::encode(coord, precision).map_err(|_| GeoError::InvalidCoordinate {
        latitude,
        longitude,
    })
}

/// Decode a geohash into the interval pair it covers.
pub fn decode_bbox(hash: &str) -> Result<CellBounds> {
    if hash.is_empty() {
        return Err(GeoError::InvalidGeohash(hash.to_string()));
    }
    validate_precision(hash.len())?;

    let rect =
        ::geohash::decode_bbox(hash).map_err(|_| GeoError::InvalidGeohash(hash.to_string()))?;
    Ok(CellBounds {
        lat: Interval::new(rect.min().y, rect.max().y),
        lon: Interval::new(rect.min().x, rect.max().x),
    })
}

/// Decode a geohash to its cell center `(latitude, longitude)`.
pub fn decode(hash: &str) -> Result<(f64, f64)> {
    decode_bbox(hash).map(|cell| cell.center())
}

/// Step from a cell to the center of its neighbor in `direction`.
///
/// Longitude wraps across the antimeridian. Latitude never crosses a pole:
/// stepping north from the top row (or south from the bottom row) stays in
/// the same row, so NE/NW collapse onto E/W and N onto the cell itself.
fn step(cell: &CellBounds, direction: Direction, precision: usize) -> Result<String> {
    let (lat_step, lon_step) = direction.offset();
    let (center_lat, center_lon) = cell.center();

    let mut lat = center_lat + f64::from(lat_step) * cell.lat_span();
    if !(-90.0..=90.0).contains(&lat) {
        lat = center_lat;
    }

    let mut lon = center_lon + f64::from(lon_step) * cell.lon_span();
    if lon > 180.0 {
        lon -= 360.0;
    } else if lon < -180.0 {
        lon += 360.0;
    }

    encode(lat, lon, precision)
}

/// Adjacent cell in one direction, at the same precision.
///
/// ```
/// use spatio_live::compute::geohash::{neighbor, Direction};
///
/// assert_eq!(neighbor("u", Direction::East).unwrap(), "v");
/// // wraps across the antimeridian
/// assert_eq!(neighbor("0", Direction::West).unwrap(), "p");
/// ```
pub fn neighbor(hash: &str, direction: Direction) -> Result<String> {
    let cell = decode_bbox(hash)?;
    step(&cell, direction, hash.len())
}

/// All eight neighbors in `Direction::ALL` order (N, NE, E, SE, S, SW, W, NW).
pub fn neighbors(hash: &str) -> Result<[String; 8]> {
    let cell = decode_bbox(hash)?;
    let mut out: [String; 8] = Default::default();
    for (slot, direction) in out.iter_mut().zip(Direction::ALL) {
        *slot = step(&cell, direction, hash.len())?;
    }
    Ok(out)
}
