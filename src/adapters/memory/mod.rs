//! In-memory graph peer and its seed snapshots.

pub mod graph_store;
pub mod seed;

pub use graph_store::{InMemoryGraphStore, MemoryStoreOptions, Stamp};
pub use seed::Seed;
