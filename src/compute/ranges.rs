//! Geohash range planning for radius queries.
//!
//! A radius search is turned into at most nine prefix ranges over the stored
//! geohash field: the center cell plus its eight neighbors at the finest
//! precision whose cells are still large enough to contain the whole disk
//! within that 3x3 block. The planned ranges are always a superset of the
//! disk; exact filtering happens later.

use crate::compute::distance::EARTH_RADIUS_KM;
use crate::compute::geohash::{self, BASE32, DEFAULT_PRECISION, MAX_PRECISION};
use crate::compute::validation::{validate_precision, validate_radius};
use crate::error::Result;
use crate::point::GeoPoint;
use smallvec::{SmallVec, smallvec};

/// Sorts after every base-32 character, closing a prefix range.
pub const RANGE_SENTINEL: char = '~';

/// Cell size in degrees `(lat_span, lon_span)` per precision 1..=12.
///
/// Each added character contributes five bits, alternating which axis gets
/// the extra bit, so the spans halve alternately in latitude and longitude.
const CELL_DEGREES: [(f64, f64); MAX_PRECISION] = [
    (45.0, 45.0),
    (5.625, 11.25),
    (1.40625, 1.40625),
    (0.17578125, 0.3515625),
    (0.0439453125, 0.0439453125),
    (0.0054931640625, 0.010986328125),
    (0.001373291015625, 0.001373291015625),
    (0.000171661376953125, 0.00034332275390625),
    (0.00004291534423828125, 0.00004291534423828125),
    (0.000005364418029785156, 0.000010728836059570312),
    (0.000001341104507446289, 0.000001341104507446289),
    (0.00000016763806343078613, 0.00000033527612686157227),
];

/// Cell size in degrees at `precision`.
pub fn cell_degrees(precision: usize) -> Result<(f64, f64)> {
    validate_precision(precision)?;
    Ok(CELL_DEGREES[precision - 1])
}

/// Finest precision whose 3x3 neighborhood contains a disk of `radius_km`
/// centered anywhere in the center cell at `latitude`.
///
/// Returns `None` when no precision guarantees coverage, i.e. the disk
/// reaches a pole or is wider than a precision-1 cell.
pub fn precision_for_radius(radius_km: f64, latitude: f64) -> Option<usize> {
    let angular = radius_km / EARTH_RADIUS_KM;
    let lat_extent = angular.to_degrees();

    if latitude.abs() + lat_extent >= 90.0 {
        return None;
    }

    // Widest longitude offset reached by a spherical cap around `latitude`.
    let lon_extent = (angular.sin() / latitude.to_radians().cos())
        .clamp(-1.0, 1.0)
        .asin()
        .to_degrees();

    (1..=MAX_PRECISION).rev().find(|&precision| {
        let (lat_span, lon_span) = CELL_DEGREES[precision - 1];
        lat_span >= lat_extent && lon_span >= lon_extent
    })
}

/// Inclusive string interval `[lower, upper]` over stored geohashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashRange {
    pub lower: String,
    pub upper: String,
}

impl HashRange {
    /// Range holding every hash that starts with `prefix`.
    pub fn prefix(prefix: &str) -> Self {
        Self {
            lower: prefix.to_string(),
            upper: format!("{}{}", prefix, RANGE_SENTINEL),
        }
    }

    /// Range holding every hash.
    pub fn full() -> Self {
        Self {
            lower: String::new(),
            upper: RANGE_SENTINEL.to_string(),
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.lower.as_str() <= hash && hash <= self.upper.as_str()
    }
}

/// Plans the covering hash ranges for radius queries.
#[derive(Debug, Clone, Copy)]
pub struct HashRangePlanner {
    max_precision: usize,
}

impl HashRangePlanner {
    /// `max_precision` is the length of the hashes stored on documents; no
    /// planned prefix is ever longer than that.
    pub fn new(max_precision: usize) -> Result<Self> {
        validate_precision(max_precision)?;
        Ok(Self { max_precision })
    }

    pub fn max_precision(&self) -> usize {
        self.max_precision
    }

    /// Covering ranges for a disk of `radius_km` around `center`.
    ///
    /// ```
    /// use spatio_live::{GeoPoint, HashRangePlanner};
    ///
    /// let planner = HashRangePlanner::default();
    /// let center = GeoPoint::new(40.5, -80.0)?;
    /// let ranges = planner.plan(&center, 5.0)?;
    /// assert!((1..=9).contains(&ranges.len()));
    /// assert!(ranges.iter().any(|r| r.contains(center.hash())));
    /// # Ok::<(), spatio_live::GeoError>(())
    /// ```
    pub fn plan(&self, center: &GeoPoint, radius_km: f64) -> Result<SmallVec<[HashRange; 9]>> {
        validate_radius(radius_km)?;

        let Some(precision) = precision_for_radius(radius_km, center.latitude()) else {
            log::debug!(
                "radius {} km around ({}, {}) needs a full scan",
                radius_km,
                center.latitude(),
                center.longitude()
            );
            return Ok(smallvec![HashRange::full()]);
        };
        let precision = precision.min(self.max_precision);

        let hash = geohash::encode(center.latitude(), center.longitude(), precision)?;
        let mut prefixes: SmallVec<[String; 9]> = SmallVec::new();
        prefixes.push(hash.clone());
        prefixes.extend(geohash::neighbors(&hash)?);
        prefixes.sort_unstable();
        prefixes.dedup();

        let ranges = merge_prefixes(&prefixes);
        log::debug!(
            "planned {} ranges at precision {} for radius {} km",
            ranges.len(),
            precision,
            radius_km
        );
        Ok(ranges)
    }
}

impl Default for HashRangePlanner {
    fn default() -> Self {
        Self {
            max_precision: DEFAULT_PRECISION,
        }
    }
}

/// Whether `next` immediately follows `prev` in base-32 order under the same
/// parent cell.
fn is_successor(prev: &str, next: &str) -> bool {
    if prev.len() != next.len() || prev.is_empty() {
        return false;
    }
    let split = prev.len() - 1;
    if prev[..split] != next[..split] {
        return false;
    }

    let position = |s: &str| BASE32.iter().position(|&c| c == s.as_bytes()[split]);
    matches!((position(prev), position(next)), (Some(a), Some(b)) if b == a + 1)
}

/// Collapse sorted, deduplicated prefixes into contiguous ranges.
fn merge_prefixes(prefixes: &[String]) -> SmallVec<[HashRange; 9]> {
    let mut ranges: SmallVec<[HashRange; 9]> = SmallVec::new();
    let mut run: Option<(&str, &str)> = None;

    for prefix in prefixes.iter().map(String::as_str) {
        run = match run {
            Some((first, last)) if is_successor(last, prefix) => Some((first, prefix)),
            Some((first, last)) => {
                ranges.push(HashRange {
                    lower: first.to_string(),
                    upper: format!("{}{}", last, RANGE_SENTINEL),
                });
                Some((prefix, prefix))
            }
            None => Some((prefix, prefix)),
        };
    }

    if let Some((first, last)) = run {
        ranges.push(HashRange {
            lower: first.to_string(),
            upper: format!("{}{}", last, RANGE_SENTINEL),
        });
    }

    ranges
}
