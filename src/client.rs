//! Entry point tying a document store to geo queries.

use crate::compute::distance::{bearing_deg, haversine_km};
use crate::config::Config;
use crate::error::Result;
use crate::point::GeoPoint;
use crate::query_ref::MutableQueryRef;
use crate::store::{DocumentStore, QueryFn};
use std::sync::Arc;

/// Geo query client over a [`DocumentStore`].
///
/// ```
/// use spatio_live::{GeoClient, MemoryStore};
///
/// let geo = GeoClient::new(MemoryStore::new());
/// let center = geo.point(40.5, -80.0)?;
/// let cities = geo.collection("cities", None);
/// assert_eq!(cities.collection(), "cities");
/// assert!(geo.point(100.0, 0.0).is_err());
/// # let _ = center;
/// # Ok::<(), spatio_live::GeoError>(())
/// ```
pub struct GeoClient<S: DocumentStore> {
    store: Arc<S>,
    config: Arc<Config>,
}

impl<S: DocumentStore> Clone for GeoClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: DocumentStore> GeoClient<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store), Config::default())
    }

    pub fn builder() -> GeoClientBuilder {
        GeoClientBuilder::new()
    }

    pub fn from_shared(store: Arc<S>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validated point hashed at the configured precision.
    pub fn point(&self, latitude: f64, longitude: f64) -> Result<GeoPoint> {
        GeoPoint::with_precision(latitude, longitude, self.config.default_precision)
    }

    /// Reference to collection `name` with an optional initial query.
    pub fn collection(&self, name: &str, query_fn: Option<QueryFn>) -> MutableQueryRef<S> {
        MutableQueryRef::with_config(
            Arc::clone(&self.store),
            name,
            query_fn,
            Arc::clone(&self.config),
        )
    }

    /// Haversine distance in kilometers.
    pub fn distance(&self, from: &GeoPoint, to: &GeoPoint) -> f64 {
        haversine_km(from.latitude(), from.longitude(), to.latitude(), to.longitude())
    }

    /// Initial bearing in degrees, in `(-180, 180]`.
    pub fn bearing(&self, from: &GeoPoint, to: &GeoPoint) -> f64 {
        bearing_deg(from.latitude(), from.longitude(), to.latitude(), to.longitude())
    }
}

/// Builder for a [`GeoClient`].
#[derive(Debug, Default)]
pub struct GeoClientBuilder {
    config: Config,
}

impl GeoClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Geohash length for points and stored documents.
    pub fn precision(mut self, precision: usize) -> Self {
        self.config = self.config.with_default_precision(precision);
        self
    }

    /// Build the client, validating the configuration.
    pub fn build<S: DocumentStore>(self, store: S) -> Result<GeoClient<S>> {
        self.build_shared(Arc::new(store))
    }

    pub fn build_shared<S: DocumentStore>(self, store: Arc<S>) -> Result<GeoClient<S>> {
        self.config.validate()?;
        Ok(GeoClient::from_shared(store, self.config))
    }
}
