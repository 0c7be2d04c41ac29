//! Collection references with a swappable query definition.

use crate::aggregator::{RadiusAggregator, WithinParams};
use crate::config::Config;
use crate::error::{GeoError, Result};
use crate::live::LiveStream;
use crate::point::GeoPoint;
use crate::store::{Document, DocumentStore, Fields, Query, QueryFn};
use futures::{Stream, StreamExt, future};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Items are tagged with the query generation they were produced for.
type Sender = mpsc::UnboundedSender<(u64, Result<Vec<Document>>)>;

struct Observer {
    id: u64,
    tx: Sender,
}

/// State shared by a reference, its observers and its pump task.
#[derive(Default)]
struct Shared {
    query_fn: Option<QueryFn>,
    /// Bumped on every query swap; snapshots from older pumps are dropped.
    generation: u64,
    observers: Vec<Observer>,
    next_observer: u64,
    pump: Option<AbortHandle>,
    latest: Option<Vec<Document>>,
}

impl Shared {
    fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.latest = None;
    }

    /// End every observer stream with `err`.
    fn fail(&mut self, err: GeoError) {
        log::warn!("query subscription failed: {}", err);
        let message = match &err {
            GeoError::Subscription(message) => message.clone(),
            other => other.to_string(),
        };
        let mut first = Some(err);
        for observer in self.observers.drain(..) {
            let item = first
                .take()
                .unwrap_or_else(|| GeoError::Subscription(message.clone()));
            let _ = observer.tx.send((self.generation, Err(item)));
        }
        self.pump = None;
        self.latest = None;
    }
}

/// A collection reference whose filter can be replaced while observers stay
/// attached.
///
/// All observers of one reference share a single store subscription. It is
/// opened when the first observer attaches and torn down when the last one
/// detaches. Clones refer to the same live state.
pub struct MutableQueryRef<S: DocumentStore> {
    store: Arc<S>,
    collection: String,
    config: Arc<Config>,
    shared: Arc<Mutex<Shared>>,
    /// Publishes the definition to running radius searches.
    query_updates: Arc<watch::Sender<Option<QueryFn>>>,
}

impl<S: DocumentStore> Clone for MutableQueryRef<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            config: Arc::clone(&self.config),
            shared: Arc::clone(&self.shared),
            query_updates: Arc::clone(&self.query_updates),
        }
    }
}

impl<S: DocumentStore> MutableQueryRef<S> {
    pub fn new(store: Arc<S>, collection: impl Into<String>, query_fn: Option<QueryFn>) -> Self {
        Self::with_config(store, collection, query_fn, Arc::new(Config::default()))
    }

    pub fn with_config(
        store: Arc<S>,
        collection: impl Into<String>,
        query_fn: Option<QueryFn>,
        config: Arc<Config>,
    ) -> Self {
        let (query_updates, _) = watch::channel(query_fn.clone());
        Self {
            store,
            collection: collection.into(),
            config,
            shared: Arc::new(Mutex::new(Shared {
                query_fn,
                ..Shared::default()
            })),
            query_updates: Arc::new(query_updates),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The effective query: the collection with the current definition applied.
    pub fn query(&self) -> Query {
        let query_fn = self.shared.lock().query_fn.clone();
        self.build_query(query_fn.as_ref())
    }

    fn build_query(&self, query_fn: Option<&QueryFn>) -> Query {
        let base = Query::collection(self.collection.as_str());
        match query_fn {
            Some(f) => f(base),
            None => base,
        }
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        let mut shared = self.shared.lock();
        shared.observers.retain(|o| !o.tx.is_closed());
        shared.observers.len()
    }

    /// Live sequence of the current result set.
    ///
    /// A late observer immediately receives the latest snapshot.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime when no subscription is
    /// active yet.
    pub fn data(&self) -> LiveStream<Vec<Document>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut shared = self.shared.lock();
        let id = shared.next_observer;
        shared.next_observer += 1;

        if let Some(latest) = &shared.latest {
            let _ = tx.send((shared.generation, Ok(latest.clone())));
        }
        shared.observers.push(Observer { id, tx });

        if shared.pump.is_none() {
            self.start_pump(&mut shared);
        }
        drop(shared);

        let state = Arc::clone(&self.shared);
        let items = UnboundedReceiverStream::new(rx).filter_map(move |(generation, item)| {
            // Snapshots still queued from before a swap belong to the old query.
            let current = item.is_err() || state.lock().generation == generation;
            future::ready(current.then_some(item))
        });

        LiveStream::from_stream(items).with_resource(ObserverGuard {
            id,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Replace the query definition.
    ///
    /// The previous store subscription is cancelled and, if observers are
    /// attached, a new one is opened against the new definition. Once this
    /// returns no observer receives a snapshot of the old definition, and
    /// running radius searches re-plan against the new one.
    pub fn change_query(&self, query_fn: Option<QueryFn>) {
        let mut shared = self.shared.lock();
        self.query_updates.send_replace(query_fn.clone());
        shared.query_fn = query_fn;
        shared.generation += 1;
        shared.stop_pump();
        log::debug!(
            "query on {} swapped (generation {})",
            self.collection,
            shared.generation
        );

        shared.observers.retain(|o| !o.tx.is_closed());
        if !shared.observers.is_empty() {
            self.start_pump(&mut shared);
        }
    }

    /// Open the store subscription for the current definition and spawn the
    /// task fanning its snapshots out to observers.
    fn start_pump(&self, shared: &mut Shared) {
        let query = self.build_query(shared.query_fn.as_ref());
        let generation = shared.generation;

        let mut snapshots = match self.store.subscribe(&query) {
            Ok(snapshots) => snapshots,
            Err(err) => {
                shared.fail(err);
                return;
            }
        };
        log::debug!("subscribed to {} (generation {})", query, generation);

        let state = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            while let Some(item) = snapshots.next().await {
                let mut shared = state.lock();
                if shared.generation != generation {
                    return;
                }
                match item {
                    Ok(docs) => {
                        shared
                            .observers
                            .retain(|o| o.tx.send((generation, Ok(docs.clone()))).is_ok());
                        shared.latest = Some(docs);
                    }
                    Err(err) => {
                        shared.fail(err);
                        return;
                    }
                }
            }

            // The store closed the subscription without an error.
            let mut shared = state.lock();
            if shared.generation == generation {
                shared.observers.clear();
                shared.pump = None;
                shared.latest = None;
            }
        });
        shared.pump = Some(task.abort_handle());
    }

    /// One-shot read of the current result set.
    pub async fn get(&self) -> Result<Vec<Document>> {
        let query = self.query();
        self.store.get(&query).await
    }

    pub async fn set_doc(&self, id: &str, fields: Fields) -> Result<()> {
        self.store.set_doc(&self.collection, id, fields).await
    }

    pub async fn update_doc(&self, id: &str, fields: Fields) -> Result<()> {
        self.store.update_doc(&self.collection, id, fields).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(&self.collection, id).await
    }

    /// Create a document under a generated id and return the id.
    pub async fn add(&self, fields: Fields) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.store.set_doc(&self.collection, &id, fields).await?;
        Ok(id)
    }

    /// Write `point` into `field` of document `id`, keeping its other fields.
    pub async fn set_point(&self, id: &str, field: &str, point: &GeoPoint) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert(field.to_string(), point.data().to_value()?);
        self.store.update_doc(&self.collection, id, fields).await
    }

    fn aggregator(&self) -> RadiusAggregator<S> {
        RadiusAggregator::with_query_updates(
            Arc::clone(&self.store),
            self.collection.clone(),
            self.query_updates.subscribe(),
            Arc::clone(&self.config),
        )
    }

    /// Live documents whose `field` lies within `radius_km` of `center`.
    ///
    /// The reference's query definition is applied to every range query. A
    /// later `change_query` tears the range subscriptions down and re-plans
    /// the search against the new definition.
    pub fn within(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        field: &str,
    ) -> Result<LiveStream<Vec<Document>>> {
        self.aggregator()
            .within(WithinParams::new(center.clone(), radius_km, field))
    }

    /// Radius search driven by a changing center/radius.
    pub fn within_stream<P>(&self, params: P) -> LiveStream<Vec<Document>>
    where
        P: Stream<Item = WithinParams> + Send + 'static,
    {
        self.aggregator().within_stream(params)
    }
}

/// Detaches one observer; the last one out tears down the subscription.
struct ObserverGuard {
    id: u64,
    shared: Arc<Mutex<Shared>>,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let mut shared = self.shared.lock();
        shared.observers.retain(|o| o.id != self.id);
        if shared.observers.is_empty() && shared.pump.is_some() {
            log::debug!("last observer detached, closing subscription");
            shared.stop_pump();
        }
    }
}
