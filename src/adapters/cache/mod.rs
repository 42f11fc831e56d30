//! In-memory caching of resolved entities.
//!
//! Uses `moka` for concurrent caching with write-through from the resolver.

pub mod moka_entity_cache;

pub use moka_entity_cache::MokaEntityCache;
