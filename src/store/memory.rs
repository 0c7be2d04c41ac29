//! In-memory realtime document store.

use super::{Document, DocumentStore, Fields, Query, SnapshotStream};
use crate::error::{GeoError, Result};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Collection = BTreeMap<String, Fields>;

struct Listener {
    id: u64,
    query: Query,
    last: Vec<Document>,
    tx: mpsc::UnboundedSender<Result<Vec<Document>>>,
}

#[derive(Debug, Default)]
struct Faults {
    subscribe: Option<String>,
    write: Option<String>,
}

/// Store statistics.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreStats {
    pub document_count: usize,
    pub listener_count: usize,
    pub writes: u64,
    pub snapshots_sent: u64,
}

/// In-process document store with realtime snapshot subscriptions.
///
/// Every subscription receives the current result set immediately. After each
/// write, a subscription receives exactly one new snapshot if (and only if)
/// its result set changed. Subscriptions whose stream has been dropped are
/// pruned on the next write or inspection.
///
/// # Examples
///
/// ```
/// use spatio_live::store::{DocumentStore, MemoryStore, Query};
/// use futures::StreamExt;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// let mut live = store.subscribe(&Query::collection("cities"))?;
/// assert!(live.next().await.unwrap()?.is_empty());
///
/// let fields = serde_json::json!({ "name": "Oslo" }).as_object().unwrap().clone();
/// store.set_doc("cities", "oslo", fields).await?;
/// assert_eq!(live.next().await.unwrap()?.len(), 1);
/// # Ok::<(), spatio_live::GeoError>(())
/// # }).unwrap();
/// ```
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<FxHashMap<String, Collection>>,
    listeners: Mutex<Vec<Listener>>,
    faults: Mutex<Faults>,
    next_listener: AtomicU64,
    writes: AtomicU64,
    snapshots_sent: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `subscribe` calls fail with `message`; `None` clears it.
    pub fn fail_subscriptions(&self, message: Option<&str>) {
        self.faults.lock().subscribe = message.map(str::to_string);
    }

    /// Make subsequent writes fail with `message`; `None` clears it.
    pub fn fail_writes(&self, message: Option<&str>) {
        self.faults.lock().write = message.map(str::to_string);
    }

    /// Terminate every live subscription on `collection` with an error, as a
    /// store would on a revoked permission or dropped connection.
    pub fn inject_error(&self, collection: &str, message: &str) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|listener| {
            if listener.query.collection != collection {
                return true;
            }
            let _ = listener
                .tx
                .send(Err(GeoError::Subscription(message.to_string())));
            log::debug!("terminated listener {} on {}", listener.id, collection);
            false
        });
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|l| !l.tx.is_closed());
        listeners.len()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            document_count: self.collections.read().values().map(BTreeMap::len).sum(),
            listener_count: self.listener_count(),
            writes: self.writes.load(Ordering::Relaxed),
            snapshots_sent: self.snapshots_sent.load(Ordering::Relaxed),
        }
    }

    fn evaluate(&self, query: &Query) -> Vec<Document> {
        self.collections
            .read()
            .get(&query.collection)
            .map(|docs| query.apply(docs))
            .unwrap_or_default()
    }

    /// Apply a mutation to one collection and notify affected listeners.
    ///
    /// The listener lock is held across the mutation so snapshots of a single
    /// subscription are emitted in write order.
    fn write<F>(&self, collection: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Collection),
    {
        if let Some(message) = self.faults.lock().write.clone() {
            return Err(GeoError::Write(message));
        }

        let mut listeners = self.listeners.lock();
        {
            let mut collections = self.collections.write();
            let docs = collections.entry(collection.to_string()).or_default();
            mutate(docs);
            if docs.is_empty() {
                collections.remove(collection);
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);

        listeners.retain_mut(|listener| {
            if listener.tx.is_closed() {
                log::debug!("pruned listener {}", listener.id);
                return false;
            }
            if listener.query.collection != collection {
                return true;
            }

            let snapshot = self.evaluate(&listener.query);
            if snapshot == listener.last {
                return true;
            }
            listener.last = snapshot.clone();
            self.snapshots_sent.fetch_add(1, Ordering::Relaxed);
            listener.tx.send(Ok(snapshot)).is_ok()
        });

        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn subscribe(&self, query: &Query) -> Result<SnapshotStream> {
        if let Some(message) = self.faults.lock().subscribe.clone() {
            return Err(GeoError::Subscription(message));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.listeners.lock();
        let snapshot = self.evaluate(query);
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);

        // The receiver is alive, so the initial send cannot fail.
        let _ = tx.send(Ok(snapshot.clone()));
        self.snapshots_sent.fetch_add(1, Ordering::Relaxed);
        log::debug!("listener {} subscribed to {}", id, query);

        listeners.push(Listener {
            id,
            query: query.clone(),
            last: snapshot,
            tx,
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn get(&self, query: &Query) -> Result<Vec<Document>> {
        Ok(self.evaluate(query))
    }

    async fn set_doc(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.write(collection, |docs| {
            docs.insert(id.to_string(), fields);
        })
    }

    async fn update_doc(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.write(collection, |docs| {
            let existing = docs.entry(id.to_string()).or_default();
            for (key, value) in fields {
                existing.insert(key, value);
            }
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.write(collection, |docs| {
            docs.remove(id);
        })
    }
}
