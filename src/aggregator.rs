//! Radius aggregation over live geohash range queries.
//!
//! A radius search fans out into one [`MutableQueryRef`] per planned hash
//! range. The aggregator keeps the latest snapshot of every range, and on each
//! update concatenates them, drops duplicate ids, keeps only documents whose
//! geo field lies within the radius and emits the result as one array.
//!
//! ```text
//!  WithinParams ──► HashRangePlanner ──► [range 0] [range 1] … [range n]
//!                                            │         │           │
//!                                        data()     data()      data()
//!                                            └────┬────┴─────┬─────┘
//!                                            latest[i] per range
//!                                                 │
//!                                      merge_snapshots (dedupe + distance)
//!                                                 │
//!                                           LiveStream<Vec<Document>>
//! ```

use crate::compute::ranges::{HashRange, HashRangePlanner};
use crate::compute::validation::validate_radius;
use crate::config::Config;
use crate::error::{GeoError, Result};
use crate::live::{LiveStream, TaskGuard};
use crate::point::GeoPoint;
use crate::query_ref::MutableQueryRef;
use crate::store::{Document, DocumentStore, QueryFn, QueryMetadata, SortDirection, query_fn};
use futures::stream::{self, BoxStream, SelectAll};
use futures::{Stream, StreamExt};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Center, radius (km) and geo field of a radius search.
#[derive(Debug, Clone, PartialEq)]
pub struct WithinParams {
    pub center: GeoPoint,
    pub radius: f64,
    pub field: String,
}

impl WithinParams {
    pub fn new(center: GeoPoint, radius: f64, field: impl Into<String>) -> Self {
        Self {
            center,
            radius,
            field: field.into(),
        }
    }
}

/// Merge per-range snapshots into the radius result.
///
/// Snapshots are concatenated in range order, the first copy of each id is
/// kept and documents farther than `radius + tolerance` from the center (or
/// without a decodable geo field) are dropped. The output is sorted by
/// distance, then id.
pub fn merge_snapshots<'a, I>(
    snapshots: I,
    params: &WithinParams,
    config: &Config,
) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Vec<Document>>,
{
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut hits: Vec<(f64, Document)> = Vec::new();

    for doc in snapshots.into_iter().flatten() {
        if !seen.insert(doc.id.as_str()) {
            continue;
        }

        let point = match doc.geo_point(&params.field) {
            Ok(point) => point,
            Err(err) => {
                log::warn!("skipping document in radius query: {}", err);
                continue;
            }
        };

        let distance = params.center.distance_to(&point);
        if distance > params.radius + config.distance_tolerance_km {
            continue;
        }

        let mut hit = doc.clone();
        hit.query_metadata = config.emit_metadata.then(|| QueryMetadata {
            distance,
            bearing: params.center.bearing_to(&point),
        });
        hits.push((distance, hit));
    }

    hits.sort_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)));
    hits.into_iter().map(|(_, doc)| doc).collect()
}

type RangeUpdate = (usize, Result<Vec<Document>>);

/// The range subscriptions of one center/radius.
struct ActiveSearch<S: DocumentStore> {
    params: WithinParams,
    ranges: SmallVec<[HashRange; 9]>,
    /// Owned exclusively by this search; dropped together with it.
    _refs: Vec<MutableQueryRef<S>>,
    updates: SelectAll<BoxStream<'static, RangeUpdate>>,
    latest: Vec<Option<Vec<Document>>>,
    last_emitted: Option<Vec<Document>>,
}

impl<S: DocumentStore> ActiveSearch<S> {
    fn start(
        ctx: &RadiusAggregator<S>,
        params: WithinParams,
        base: Option<QueryFn>,
    ) -> Result<Self> {
        validate_radius(params.radius)?;

        let planner = HashRangePlanner::new(ctx.config.default_precision)?;
        let ranges = planner.plan(&params.center, params.radius)?;
        let geohash_field = format!("{}.geohash", params.field);

        let mut refs = Vec::with_capacity(ranges.len());
        let mut updates = SelectAll::new();

        for (index, range) in ranges.iter().enumerate() {
            let base = base.clone();
            let field = geohash_field.clone();
            let range = range.clone();
            let range_fn = query_fn(move |q| {
                let q = match &base {
                    Some(f) => f(q),
                    None => q,
                };
                q.where_range(field.as_str(), range.lower.as_str(), range.upper.as_str())
                    .order_by(field.as_str(), SortDirection::Ascending)
            });

            let range_ref = MutableQueryRef::with_config(
                Arc::clone(&ctx.store),
                ctx.collection.clone(),
                Some(range_fn),
                Arc::clone(&ctx.config),
            );
            updates.push(range_ref.data().map(move |item| (index, item)).boxed());
            refs.push(range_ref);
        }

        log::debug!(
            "radius search on {} around ({}, {}) r={} km over {} ranges",
            ctx.collection,
            params.center.latitude(),
            params.center.longitude(),
            params.radius,
            ranges.len()
        );

        Ok(Self {
            params,
            latest: vec![None; ranges.len()],
            ranges,
            _refs: refs,
            updates,
            last_emitted: None,
        })
    }

    /// Record a range snapshot and return the merged result, if one is due.
    ///
    /// Nothing is emitted until every range has reported once.
    fn apply(
        &mut self,
        index: usize,
        docs: Vec<Document>,
        config: &Config,
    ) -> Option<Vec<Document>> {
        self.latest[index] = Some(docs);
        if self.latest.iter().any(Option::is_none) {
            return None;
        }

        let merged = merge_snapshots(self.latest.iter().flatten(), &self.params, config);

        if config.suppress_duplicate_emissions && self.last_emitted.as_ref() == Some(&merged) {
            return None;
        }
        self.last_emitted = Some(merged.clone());
        Some(merged)
    }
}

/// Next update of the active search; pending while there is none.
async fn next_update<S: DocumentStore>(
    active: &mut Option<ActiveSearch<S>>,
) -> Option<RangeUpdate> {
    match active {
        Some(search) => search.updates.next().await,
        None => std::future::pending().await,
    }
}

/// Merges live range queries into one radius-filtered live result.
pub struct RadiusAggregator<S: DocumentStore> {
    store: Arc<S>,
    collection: String,
    query: watch::Receiver<Option<QueryFn>>,
    config: Arc<Config>,
}

impl<S: DocumentStore> Clone for RadiusAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            query: self.query.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: DocumentStore> RadiusAggregator<S> {
    /// `query_fn` is applied to every range query before the range filter.
    pub fn new(
        store: Arc<S>,
        collection: impl Into<String>,
        query_fn: Option<QueryFn>,
        config: Arc<Config>,
    ) -> Self {
        let (_, query) = watch::channel(query_fn);
        Self::with_query_updates(store, collection, query, config)
    }

    /// Like [`RadiusAggregator::new`], with the base query read from `query`.
    ///
    /// Whenever a new definition is published, running searches drop their
    /// range subscriptions and re-plan with the same parameters.
    pub fn with_query_updates(
        store: Arc<S>,
        collection: impl Into<String>,
        query: watch::Receiver<Option<QueryFn>>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            query,
            config,
        }
    }

    /// Live radius search for fixed parameters.
    ///
    /// Fails immediately with [`GeoError::InvalidRadius`] for a negative radius.
    pub fn within(&self, params: WithinParams) -> Result<LiveStream<Vec<Document>>> {
        validate_radius(params.radius)?;
        Ok(self.within_stream(stream::once(async move { params })))
    }

    /// Live radius search following a stream of parameters.
    ///
    /// Each new parameter set tears down all range subscriptions of the
    /// previous one before planning and subscribing again; results computed
    /// for superseded parameters are never emitted. Invalid parameters and
    /// range subscription failures end the stream with an error. The search
    /// keeps running with its last parameters after `params` ends.
    pub fn within_stream<P>(&self, params: P) -> LiveStream<Vec<Document>>
    where
        P: Stream<Item = WithinParams> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.clone().run(params.boxed(), tx));
        LiveStream::from_stream(UnboundedReceiverStream::new(rx))
            .with_resource(TaskGuard(task.abort_handle()))
    }

    async fn run(
        self,
        mut params: BoxStream<'static, WithinParams>,
        tx: mpsc::UnboundedSender<Result<Vec<Document>>>,
    ) {
        let mut query = self.query.clone();
        let mut active: Option<ActiveSearch<S>> = None;
        let mut params_open = true;
        let mut query_open = true;

        loop {
            tokio::select! {
                next = params.next(), if params_open => match next {
                    Some(next) => {
                        // Cancel the previous ranges before opening new ones.
                        active = None;
                        let base = query.borrow_and_update().clone();
                        match ActiveSearch::start(&self, next, base) {
                            Ok(search) => active = Some(search),
                            Err(err) => {
                                let _ = tx.send(Err(err));
                                return;
                            }
                        }
                    }
                    None => {
                        params_open = false;
                        if active.is_none() {
                            return;
                        }
                    }
                },
                changed = query.changed(), if query_open => match changed {
                    Ok(()) => {
                        let Some(params) = active.take().map(|search| search.params) else {
                            continue;
                        };
                        log::debug!(
                            "query on {} changed, re-planning radius search",
                            self.collection
                        );
                        let base = query.borrow_and_update().clone();
                        match ActiveSearch::start(&self, params, base) {
                            Ok(search) => active = Some(search),
                            Err(err) => {
                                let _ = tx.send(Err(err));
                                return;
                            }
                        }
                    }
                    Err(_) => query_open = false,
                },
                update = next_update(&mut active), if active.is_some() => match update {
                    Some((index, Ok(docs))) => {
                        let Some(search) = active.as_mut() else { continue };
                        if let Some(merged) = search.apply(index, docs, &self.config)
                            && tx.send(Ok(merged)).is_err()
                        {
                            return;
                        }
                    }
                    Some((index, Err(err))) => {
                        if let Some(search) = &active {
                            log::warn!(
                                "range {:?} of radius search on {} failed",
                                search.ranges.get(index),
                                self.collection
                            );
                        }
                        let _ = tx.send(Err(err));
                        return;
                    }
                    None => {
                        let _ = tx.send(Err(GeoError::Subscription(
                            "range subscriptions closed".to_string(),
                        )));
                        return;
                    }
                },
                _ = tx.closed() => return,
            }
        }
    }
}
