//! Live radius queries over realtime document stores.
//!
//! Document stores index scalar ranges, not 2-D distance. A radius search is
//! decomposed into at most nine geohash range queries, each subscribed to
//! live; their snapshots are merged, deduplicated, filtered by exact distance
//! and re-emitted as one live result that follows the data as it changes.
//!
//! ```rust
//! use futures::StreamExt;
//! use spatio_live::{GeoClient, MemoryStore};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let geo = GeoClient::new(MemoryStore::new());
//! let cities = geo.collection("cities", None);
//!
//! let pittsburgh = geo.point(40.44, -79.99)?;
//! let mut fields = serde_json::Map::new();
//! fields.insert("position".into(), pittsburgh.data().to_value()?);
//! cities.set_doc("pittsburgh", fields).await?;
//!
//! let center = geo.point(40.5, -80.0)?;
//! let mut nearby = cities.within(&center, 10.0, "position")?;
//! let docs = nearby.next().await.unwrap()?;
//! assert_eq!(docs[0].id, "pittsburgh");
//! # Ok::<(), spatio_live::GeoError>(())
//! # }).unwrap();
//! ```

pub mod aggregator;
pub mod client;
pub mod compute;
pub mod config;
pub mod error;
pub mod live;
pub mod point;
pub mod query_ref;
pub mod store;

pub use aggregator::{RadiusAggregator, WithinParams, merge_snapshots};
pub use client::{GeoClient, GeoClientBuilder};
pub use compute::geohash::{DEFAULT_PRECISION, Direction};
pub use compute::ranges::{HashRange, HashRangePlanner};
pub use config::Config;
pub use error::{GeoError, Result};
pub use live::{LiveStream, first_value};
pub use point::{GeoFieldData, GeoPoint, LatLng};
pub use query_ref::MutableQueryRef;
pub use store::{
    Document, DocumentStore, Fields, MemoryStore, Query, QueryFn, QueryMetadata, SortDirection,
    query_fn,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoClient, GeoClientBuilder, GeoError, GeoPoint, Result};

    pub use crate::{Document, DocumentStore, MemoryStore, Query, QueryFn, query_fn};

    pub use crate::{LiveStream, MutableQueryRef, WithinParams, first_value};

    pub use crate::Config;
}
