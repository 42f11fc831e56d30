use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::models::{Actor, Entity, GraphPointer};

/// Last resolved snapshot of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub entity: Entity,
    pub resolved_at: DateTime<Utc>,
}

/// Process-lifetime store of resolved entities, keyed by canonical pointer.
///
/// Not a correctness boundary: bypassing it and re-resolving is always valid.
/// Entries are overwritten on re-resolution and never expire by age.
#[async_trait]
pub trait EntityCache: Send + Sync {
    async fn get(&self, key: &GraphPointer) -> Option<CacheEntry>;

    async fn put(&self, key: GraphPointer, entity: Entity);

    async fn invalidate(&self, key: &GraphPointer);

    async fn invalidate_all(&self);

    /// Cached actors whose `game_id` is `game_id`.
    async fn actors_in_game(&self, game_id: &str) -> Vec<Actor>;

    /// Approximate number of cached entries.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
