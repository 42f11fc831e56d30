use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::models::{GraphPointer, RawNode};

/// Handle of a standing watch registered with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// A completion-less stream of updates plus the id needed to release it.
///
/// The stream never signals that it has delivered "everything"; it only ends
/// when the watch is released or the store goes away.
#[derive(Debug)]
pub struct StoreWatch<T> {
    pub id: WatchId,
    pub events: mpsc::UnboundedReceiver<T>,
}

/// One child of a watched node. A `null` value is a tombstone.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildUpdate {
    pub key: String,
    pub value: Value,
}

/// New version of a watched node; `None` when the node was deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub path: GraphPointer,
    pub node: Option<RawNode>,
}

/// Local acknowledgement of a merge write. Says nothing about other peers.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAck {
    pub path: GraphPointer,
    pub fields: usize,
    pub acknowledged_at: DateTime<Utc>,
}

/// Replicated graph store primitives.
///
/// The store offers eventual, last-write-wins-per-field convergence and no
/// transactions across paths. Implementations must be cheap to call
/// concurrently.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Whether the local peer is initialized and connected.
    fn is_ready(&self) -> bool;

    /// Single-shot read of a node's current local value.
    async fn get_once(&self, path: &GraphPointer) -> SyncResult<Option<RawNode>>;

    /// Stream the children of a node, current and future, without an end marker.
    async fn watch_children(&self, path: &GraphPointer) -> SyncResult<StoreWatch<ChildUpdate>>;

    /// Stream every new version of a single node.
    async fn watch(&self, path: &GraphPointer) -> SyncResult<StoreWatch<NodeUpdate>>;

    /// Release a watch. Unknown ids are ignored.
    fn unwatch(&self, id: WatchId);

    /// Best-effort merge write of the given fields.
    async fn write(&self, path: &GraphPointer, patch: RawNode) -> SyncResult<WriteAck>;
}

/// Fail fast with `StoreUnavailable` when the peer is not initialized.
pub fn ensure_ready(store: &dyn GraphStore) -> SyncResult<()> {
    if store.is_ready() {
        Ok(())
    } else {
        Err(SyncError::StoreUnavailable(
            "graph store is not initialized".to_string(),
        ))
    }
}
