//! Document store abstraction.
//!
//! The realtime document store is an external collaborator: it evaluates
//! equality/range queries, pushes full result snapshots to subscribers and
//! performs writes. [`DocumentStore`] captures exactly that surface so radius
//! queries can run against any backend; [`MemoryStore`] is the in-process
//! implementation.

pub mod memory;
pub mod query;

pub use memory::MemoryStore;
pub use query::{Filter, OrderBy, Query, QueryFn, SortDirection, compare_values, query_fn};

use crate::error::{GeoError, Result};
use crate::point::GeoPoint;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// Document field mapping.
pub type Fields = serde_json::Map<String, Value>;

/// Live sequence of full result snapshots. Dropping it cancels the
/// subscription.
pub type SnapshotStream = BoxStream<'static, Result<Vec<Document>>>;

/// Distance (km) and bearing (degrees) from a radius query's center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub distance: f64,
    pub bearing: f64,
}

/// A document as observed from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_metadata: Option<QueryMetadata>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            query_metadata: None,
        }
    }

    /// Look up a dotted field path such as `"position.geohash"`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Decode the geo field stored under `field`.
    pub fn geo_point(&self, field: &str) -> Result<GeoPoint> {
        self.get_path(field)
            .and_then(GeoPoint::from_field_value)
            .ok_or_else(|| GeoError::MissingGeoField {
                id: self.id.clone(),
                field: field.to_string(),
            })
    }
}

/// Realtime document store used by query references and radius queries.
///
/// Implementations must deliver snapshots of one subscription in order and
/// emit the current result set immediately on subscribe.
pub trait DocumentStore: Send + Sync + 'static {
    /// Subscribe to the full result set of `query`.
    fn subscribe(&self, query: &Query) -> Result<SnapshotStream>;

    /// One-shot read of the current result set.
    fn get(&self, query: &Query) -> impl Future<Output = Result<Vec<Document>>> + Send;

    /// Create or replace a document.
    fn set_doc(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Shallow-merge `fields` into an existing document, creating it if absent.
    fn update_doc(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete(&self, collection: &str, id: &str) -> impl Future<Output = Result<()>> + Send;
}
