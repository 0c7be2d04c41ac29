//! Compute layer: pure geo functions independent of any store or stream.
//!
//! - Geohash encoding, decoding and neighbor computation
//! - Great-circle distance and bearing
//! - Hash range planning for radius queries
//! - Input validation

pub mod distance;
pub mod geohash;
pub mod ranges;
pub mod validation;
