//! Entity cache backed by a moka concurrent cache.
//!
//! Capacity-bounded only: entries never expire by age, staleness is handled
//! by callers forcing a refresh.

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;

use crate::domain::models::{Actor, Entity, GraphPointer};
use crate::domain::ports::{CacheEntry, EntityCache};

/// Default maximum number of cached entities.
const ENTITY_CACHE_MAX_CAPACITY: u64 = 10_000;

pub struct MokaEntityCache {
    entries: Cache<GraphPointer, CacheEntry>,
}

impl MokaEntityCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(ENTITY_CACHE_MAX_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        let entries = Cache::builder().max_capacity(max_capacity).build();
        Self { entries }
    }
}

impl Default for MokaEntityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityCache for MokaEntityCache {
    async fn get(&self, key: &GraphPointer) -> Option<CacheEntry> {
        self.entries.get(key).await
    }

    async fn put(&self, key: GraphPointer, entity: Entity) {
        let entry = CacheEntry {
            entity,
            resolved_at: Utc::now(),
        };
        self.entries.insert(key, entry).await;
    }

    async fn invalidate(&self, key: &GraphPointer) {
        self.entries.invalidate(key).await;
    }

    async fn invalidate_all(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    async fn actors_in_game(&self, game_id: &str) -> Vec<Actor> {
        let mut actors: Vec<Actor> = self
            .entries
            .iter()
            .filter_map(|(_, entry)| entry.entity.into_actor())
            .filter(|actor| actor.game_id.as_deref() == Some(game_id))
            .collect();
        actors.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        actors
    }

    fn len(&self) -> u64 {
        self.entries.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Card, EntityKind};

    fn actor(id: &str, game: &str, user: &str) -> Entity {
        Entity::Actor(Actor {
            id: id.to_string(),
            game_id: Some(game.to_string()),
            user_id: Some(user.to_string()),
            name: None,
            card_id: None,
            card: None,
            created_at: None,
        })
    }

    #[tokio::test]
    async fn test_put_then_get_is_immediate() {
        let cache = MokaEntityCache::new();
        let key = EntityKind::Actor.pointer("a1").unwrap();
        cache.put(key.clone(), actor("a1", "g1", "u1")).await;

        let entry = cache.get(&key).await.expect("entry should be visible");
        assert_eq!(entry.entity, actor("a1", "g1", "u1"));
    }

    #[tokio::test]
    async fn test_put_overwrites_and_invalidate_removes() {
        let cache = MokaEntityCache::new();
        let key = EntityKind::Actor.pointer("a1").unwrap();
        cache.put(key.clone(), actor("a1", "g1", "u1")).await;
        cache.put(key.clone(), actor("a1", "g1", "u2")).await;

        let entry = cache.get(&key).await.unwrap();
        assert!(entry.entity.as_actor().unwrap().is_owned_by("u2"));

        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_actors_in_game_filters_kind_and_game() {
        let cache = MokaEntityCache::new();
        cache
            .put(EntityKind::Actor.pointer("a2").unwrap(), actor("a2", "g1", "u2"))
            .await;
        cache
            .put(EntityKind::Actor.pointer("a1").unwrap(), actor("a1", "g1", "u1"))
            .await;
        cache
            .put(EntityKind::Actor.pointer("a3").unwrap(), actor("a3", "g2", "u1"))
            .await;
        cache
            .put(
                EntityKind::Card.pointer("c1").unwrap(),
                Entity::Card(Card {
                    id: "c1".to_string(),
                    title: None,
                    role: None,
                    description: None,
                    deck_id: None,
                }),
            )
            .await;

        let ids: Vec<String> = cache
            .actors_in_game("g1")
            .await
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a1".to_string(), "a2".to_string()]);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = MokaEntityCache::new();
        let key = EntityKind::Actor.pointer("a1").unwrap();
        cache.put(key.clone(), actor("a1", "g1", "u1")).await;
        cache.invalidate_all().await;
        assert!(cache.get(&key).await.is_none());
    }
}
