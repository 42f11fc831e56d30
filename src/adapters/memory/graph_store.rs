//! In-memory graph peer.
//!
//! A single local peer of the replicated store: last-write-wins per field,
//! children streamed one by one (optionally with a delay between them to
//! mimic replication arrival), per-node watch feeds, and switches for the
//! "uninitialized" and "write rejected" conditions. Writes from other peers
//! are simulated with [`InMemoryGraphStore::merge_remote`] and
//! [`InMemoryGraphStore::schedule_write`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::seed::Seed;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::models::{GraphPointer, RawNode};
use crate::domain::ports::{
    ensure_ready, ChildUpdate, GraphStore, NodeUpdate, StoreWatch, WatchId, WriteAck,
};

/// Peer id stamped on local writes.
const LOCAL_PEER: &str = "local";

/// Last-write-wins stamp: later clock wins, peer id breaks ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    pub clock: u64,
    pub peer: String,
}

impl Stamp {
    pub fn new(clock: u64, peer: impl Into<String>) -> Self {
        Self {
            clock,
            peer: peer.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStoreOptions {
    /// Delay before each child of an initial `watch_children` replay.
    pub child_delivery_delay: Duration,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            child_delivery_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
struct FieldState {
    value: Value,
    stamp: Stamp,
}

struct Watcher<T> {
    path: GraphPointer,
    tx: mpsc::UnboundedSender<T>,
}

#[derive(Default)]
struct StoreState {
    nodes: HashMap<GraphPointer, BTreeMap<String, FieldState>>,
    child_watchers: HashMap<WatchId, Watcher<ChildUpdate>>,
    node_watchers: HashMap<WatchId, Watcher<NodeUpdate>>,
    write_counts: HashMap<GraphPointer, usize>,
    last_clock: u64,
}

impl StoreState {
    fn next_local_stamp(&mut self) -> Stamp {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        self.last_clock = now.max(self.last_clock + 1);
        Stamp::new(self.last_clock, LOCAL_PEER)
    }

    fn materialize(&self, path: &GraphPointer) -> Option<RawNode> {
        let fields = self.nodes.get(path)?;
        let node: RawNode = fields
            .iter()
            .filter(|(_, field)| !field.value.is_null())
            .map(|(key, field)| (key.clone(), field.value.clone()))
            .collect();
        (!node.is_empty()).then_some(node)
    }

    /// Merge a patch; returns the fields that were applied.
    fn merge(&mut self, path: &GraphPointer, patch: RawNode, stamp: &Stamp) -> Vec<(String, Value)> {
        let fields = self.nodes.entry(path.clone()).or_default();
        let mut applied = Vec::new();
        for (key, value) in patch {
            let wins = fields.get(&key).is_none_or(|current| *stamp >= current.stamp);
            if wins {
                fields.insert(
                    key.clone(),
                    FieldState {
                        value: value.clone(),
                        stamp: stamp.clone(),
                    },
                );
                applied.push((key, value));
            } else {
                trace!(path = %path, field = %key, "stale write lost last-write-wins merge");
            }
        }
        applied
    }

    fn notify(&mut self, path: &GraphPointer, applied: &[(String, Value)]) {
        if applied.is_empty() {
            return;
        }

        self.child_watchers.retain(|_, watcher| {
            if watcher.path != *path {
                return true;
            }
            applied.iter().all(|(key, value)| {
                watcher
                    .tx
                    .send(ChildUpdate {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .is_ok()
            })
        });

        let node = self.materialize(path);
        self.node_watchers.retain(|_, watcher| {
            watcher.path != *path
                || watcher
                    .tx
                    .send(NodeUpdate {
                        path: path.clone(),
                        node: node.clone(),
                    })
                    .is_ok()
        });
    }
}

/// Local in-memory peer of the graph store.
pub struct InMemoryGraphStore {
    state: Arc<Mutex<StoreState>>,
    ready: AtomicBool,
    reject_writes: AtomicBool,
    next_watch: AtomicU64,
    options: MemoryStoreOptions,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::with_options(MemoryStoreOptions::default())
    }

    pub fn with_options(options: MemoryStoreOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            ready: AtomicBool::new(true),
            reject_writes: AtomicBool::new(false),
            next_watch: AtomicU64::new(1),
            options,
        }
    }

    /// Build a peer preloaded with a seed snapshot.
    pub fn from_seed(seed: Seed, options: MemoryStoreOptions) -> Self {
        let store = Self::with_options(options);
        for (path, node) in seed.nodes {
            store.seed_node(&path, node);
        }
        store
    }

    /// Export every live node.
    pub fn snapshot(&self) -> Seed {
        let state = self.lock();
        let nodes = state
            .nodes
            .keys()
            .filter_map(|path| state.materialize(path).map(|node| (path.clone(), node)))
            .collect();
        Seed { nodes }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert data as if it had already replicated; does not count as a write.
    pub fn seed_node(&self, path: &GraphPointer, node: RawNode) {
        let mut state = self.lock();
        let stamp = state.next_local_stamp();
        let applied = state.merge(path, node, &stamp);
        state.notify(path, &applied);
    }

    /// Apply a write from another peer carrying its own stamp.
    pub fn merge_remote(&self, path: &GraphPointer, patch: RawNode, stamp: &Stamp) {
        let mut state = self.lock();
        state.last_clock = state.last_clock.max(stamp.clock);
        let applied = state.merge(path, patch, stamp);
        *state.write_counts.entry(path.clone()).or_default() += 1;
        state.notify(path, &applied);
    }

    /// Land a local-looking write after `after`, as if it replicated late.
    pub fn schedule_write(self: &Arc<Self>, path: GraphPointer, patch: RawNode, after: Duration) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let mut state = store.lock();
            let stamp = state.next_local_stamp();
            let applied = state.merge(&path, patch, &stamp);
            state.notify(&path, &applied);
        });
    }

    /// Tombstone every field of a node.
    pub fn delete(&self, path: &GraphPointer) {
        let mut state = self.lock();
        let keys: Vec<String> = state
            .nodes
            .get(path)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();
        let patch: RawNode = keys.into_iter().map(|key| (key, Value::Null)).collect();
        let stamp = state.next_local_stamp();
        let applied = state.merge(path, patch, &stamp);
        state.notify(path, &applied);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of `write`/`merge_remote` calls that targeted `path`.
    pub fn write_count(&self, path: &GraphPointer) -> usize {
        self.lock().write_counts.get(path).copied().unwrap_or(0)
    }

    pub fn active_watch_count(&self) -> usize {
        let state = self.lock();
        state.child_watchers.len() + state.node_watchers.len()
    }

    fn next_watch_id(&self) -> WatchId {
        WatchId(self.next_watch.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Replay the current children of `path` to a child watcher, one per delay
/// tick, reading each child's value at send time.
async fn replay_children(
    state: Arc<Mutex<StoreState>>,
    id: WatchId,
    path: GraphPointer,
    keys: Vec<String>,
    delay: Duration,
) {
    for key in keys {
        tokio::time::sleep(delay).await;
        let guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(watcher) = guard.child_watchers.get(&id) else {
            trace!(%id, "child replay stopped, watch released");
            return;
        };
        let value = guard
            .nodes
            .get(&path)
            .and_then(|fields| fields.get(&key))
            .map(|field| field.value.clone());
        if let Some(value) = value.filter(|v| !v.is_null()) {
            let _ = watcher.tx.send(ChildUpdate { key, value });
        }
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn get_once(&self, path: &GraphPointer) -> SyncResult<Option<RawNode>> {
        ensure_ready(self)?;
        Ok(self.lock().materialize(path))
    }

    async fn watch_children(&self, path: &GraphPointer) -> SyncResult<StoreWatch<ChildUpdate>> {
        ensure_ready(self)?;
        let id = self.next_watch_id();
        let (tx, events) = mpsc::unbounded_channel();
        let delay = self.options.child_delivery_delay;

        let keys: Vec<String> = {
            let mut state = self.lock();
            let current = state.materialize(path).unwrap_or_default();
            if delay.is_zero() {
                for (key, value) in &current {
                    let _ = tx.send(ChildUpdate {
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
            state.child_watchers.insert(
                id,
                Watcher {
                    path: path.clone(),
                    tx,
                },
            );
            current.keys().cloned().collect()
        };

        if !delay.is_zero() && !keys.is_empty() {
            tokio::spawn(replay_children(
                Arc::clone(&self.state),
                id,
                path.clone(),
                keys,
                delay,
            ));
        }

        debug!(%id, path = %path, "child watch registered");
        Ok(StoreWatch { id, events })
    }

    async fn watch(&self, path: &GraphPointer) -> SyncResult<StoreWatch<NodeUpdate>> {
        ensure_ready(self)?;
        let id = self.next_watch_id();
        let (tx, events) = mpsc::unbounded_channel();

        let mut state = self.lock();
        if let Some(node) = state.materialize(path) {
            let _ = tx.send(NodeUpdate {
                path: path.clone(),
                node: Some(node),
            });
        }
        state.node_watchers.insert(
            id,
            Watcher {
                path: path.clone(),
                tx,
            },
        );
        drop(state);

        debug!(%id, path = %path, "node watch registered");
        Ok(StoreWatch { id, events })
    }

    fn unwatch(&self, id: WatchId) {
        let mut state = self.lock();
        let removed =
            state.child_watchers.remove(&id).is_some() || state.node_watchers.remove(&id).is_some();
        if removed {
            debug!(%id, "watch released");
        }
    }

    async fn write(&self, path: &GraphPointer, patch: RawNode) -> SyncResult<WriteAck> {
        ensure_ready(self)?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(SyncError::WriteFailed {
                path: path.to_string(),
                reason: "peer rejected write".to_string(),
            });
        }

        let fields = patch.len();
        let mut state = self.lock();
        let stamp = state.next_local_stamp();
        let applied = state.merge(path, patch, &stamp);
        *state.write_counts.entry(path.clone()).or_default() += 1;
        state.notify(path, &applied);

        Ok(WriteAck {
            path: path.clone(),
            fields,
            acknowledged_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ptr(raw: &str) -> GraphPointer {
        GraphPointer::parse(raw).unwrap()
    }

    fn node(value: Value) -> RawNode {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_write_merges_fields() {
        let store = InMemoryGraphStore::new();
        let path = ptr("games/g1");
        store.write(&path, node(json!({"name": "Council"}))).await.unwrap();
        store.write(&path, node(json!({"status": "open"}))).await.unwrap();

        let stored = store.get_once(&path).await.unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&json!("Council")));
        assert_eq!(stored.get("status"), Some(&json!("open")));
        assert_eq!(store.write_count(&path), 2);
    }

    #[tokio::test]
    async fn test_older_remote_write_loses() {
        let store = InMemoryGraphStore::new();
        let path = ptr("games/g1/identity");
        store.merge_remote(&path, node(json!({"u1": "a2"})), &Stamp::new(200, "peer-b"));
        store.merge_remote(&path, node(json!({"u1": "a1"})), &Stamp::new(100, "peer-a"));

        let stored = store.get_once(&path).await.unwrap().unwrap();
        assert_eq!(stored.get("u1"), Some(&json!("a2")));
    }

    #[tokio::test]
    async fn test_equal_clock_breaks_tie_on_peer() {
        let store = InMemoryGraphStore::new();
        let path = ptr("games/g1/identity");
        store.merge_remote(&path, node(json!({"u1": "from-b"})), &Stamp::new(100, "peer-b"));
        store.merge_remote(&path, node(json!({"u1": "from-a"})), &Stamp::new(100, "peer-a"));

        let stored = store.get_once(&path).await.unwrap().unwrap();
        assert_eq!(stored.get("u1"), Some(&json!("from-b")));
    }

    #[tokio::test]
    async fn test_unready_store_fails_fast() {
        let store = InMemoryGraphStore::new();
        store.set_ready(false);
        let err = store.get_once(&ptr("games/g1")).await.unwrap_err();
        assert!(matches!(err, SyncError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_child_watch_streams_existing_and_new_children() {
        let store = InMemoryGraphStore::new();
        let path = ptr("games/g1/actors");
        store.seed_node(&path, node(json!({"a1": {"#": "actors/a1"}})));

        let mut watch = store.watch_children(&path).await.unwrap();
        let first = watch.events.recv().await.unwrap();
        assert_eq!(first.key, "a1");

        store
            .write(&path, node(json!({"a2": {"#": "actors/a2"}})))
            .await
            .unwrap();
        let second = watch.events.recv().await.unwrap();
        assert_eq!(second.key, "a2");

        store.unwatch(watch.id);
        assert_eq!(store.active_watch_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_reports_missing_node() {
        let store = InMemoryGraphStore::new();
        let path = ptr("actors/a1");
        store.seed_node(&path, node(json!({"name": "Mayor"})));
        let mut watch = store.watch(&path).await.unwrap();
        assert!(watch.events.recv().await.unwrap().node.is_some());

        store.delete(&path);
        assert!(watch.events.recv().await.unwrap().node.is_none());
        assert!(store.get_once(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_round_trips_live_nodes() {
        let store = InMemoryGraphStore::new();
        store.seed_node(&ptr("users/u1"), node(json!({"alias": "ana"})));
        store.seed_node(&ptr("users/u2"), node(json!({"alias": "bo"})));
        store.delete(&ptr("users/u2"));

        let seed = store.snapshot();
        assert_eq!(seed.nodes.len(), 1);
        let restored = InMemoryGraphStore::from_seed(seed, MemoryStoreOptions::default());
        assert!(restored.get_once(&ptr("users/u1")).await.unwrap().is_some());
    }
}
