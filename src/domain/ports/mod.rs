//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - GraphStore: the replicated graph store's read/watch/write primitives
//! - EntityCache: in-process cache of resolved entities
//! - HintStore: client-local identity hints
//!
//! These traits keep the resolution layer independent of the concrete store,
//! so tests can substitute a deterministic in-memory peer.

pub mod entity_cache;
pub mod graph_store;
pub mod hint_store;

pub use entity_cache::{CacheEntry, EntityCache};
pub use graph_store::{
    ensure_ready, ChildUpdate, GraphStore, NodeUpdate, StoreWatch, WatchId, WriteAck,
};
pub use hint_store::HintStore;
