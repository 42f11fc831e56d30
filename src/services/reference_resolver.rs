//! Reference resolver: pointer to typed value.
//!
//! A node is fetched once, every field is classified through
//! [`GraphValue::classify`], and pointer-valued fields are inlined one level
//! deep as their scalar subset. Inlined nodes never have their own pointers
//! followed, so a resolve call performs at most `1 + distinct targets` reads
//! and always terminates, whatever the shape of the graph.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::domain::errors::SyncResult;
use crate::domain::models::{
    entity_kind_of, Actor, Entity, EntityKind, Game, GraphPointer, GraphValue, InlinedNode,
    RawNode, ResolvedField, ResolvedNode,
};
use crate::domain::ports::{ensure_ready, EntityCache, GraphStore};

/// Whether a lookup may be served from the entity cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Serve a cache hit when there is one.
    #[default]
    Cached,
    /// Always read the store; the result still refreshes the cache.
    Refresh,
}

#[derive(Clone)]
pub struct ReferenceResolver {
    store: Arc<dyn GraphStore>,
    cache: Arc<dyn EntityCache>,
}

impl ReferenceResolver {
    pub fn new(store: Arc<dyn GraphStore>, cache: Arc<dyn EntityCache>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn EntityCache> {
        &self.cache
    }

    /// Dereference `pointer`, inlining one level of pointer fields.
    ///
    /// `Ok(None)` when the node is missing or deleted.
    pub async fn resolve(&self, pointer: &GraphPointer) -> SyncResult<Option<ResolvedNode>> {
        ensure_ready(self.store.as_ref())?;
        let Some(raw) = self.store.get_once(pointer).await? else {
            debug!(pointer = %pointer, "node not found");
            return Ok(None);
        };
        self.resolve_raw(pointer, raw).await.map(Some)
    }

    /// Resolve a node whose raw fields are already in hand, such as a watch
    /// delivery or an inline collection child.
    pub async fn resolve_raw(&self, soul: &GraphPointer, raw: RawNode) -> SyncResult<ResolvedNode> {
        let mut node = ResolvedNode::new(soul.clone());
        let mut pointer_fields = Vec::new();

        for (name, value) in &raw {
            match GraphValue::classify(value) {
                Ok(GraphValue::Inline(scalar)) => {
                    node.fields.insert(name.clone(), ResolvedField::Scalar(scalar));
                }
                Ok(GraphValue::Pointer(target)) => pointer_fields.push((name.clone(), target)),
                Err(err) => {
                    warn!(soul = %soul, field = %name, error = %err, "skipping malformed field");
                }
            }
        }

        // Fields naming the same target share one fetch.
        let targets: Vec<GraphPointer> = pointer_fields
            .iter()
            .map(|(_, target)| target)
            .filter(|target| *target != soul)
            .collect::<HashSet<_>>()
            .into_iter()
            .cloned()
            .collect();
        let fetched = try_join_all(targets.iter().map(|target| self.store.get_once(target))).await?;
        let fetched: HashMap<&GraphPointer, Option<RawNode>> =
            targets.iter().zip(fetched).collect();

        let mut visited: HashSet<&GraphPointer> = HashSet::from([soul]);
        visited.extend(fetched.iter().filter(|(_, raw)| raw.is_some()).map(|(p, _)| *p));

        for (name, target) in pointer_fields {
            let field = if target == *soul {
                ResolvedField::Cycle(target)
            } else {
                match fetched.get(&target) {
                    Some(Some(raw)) => ResolvedField::Inline(inline_subset(&target, raw, &visited)),
                    _ => ResolvedField::Dangling(target),
                }
            };
            node.fields.insert(name, field);
        }

        Ok(node)
    }

    /// Resolve and decode the entity at `pointer`, writing it to the cache
    /// before returning it.
    pub async fn resolve_entity(
        &self,
        pointer: &GraphPointer,
        freshness: Freshness,
    ) -> SyncResult<Option<Entity>> {
        let kind = entity_kind_of(pointer)?;

        if freshness == Freshness::Cached {
            if let Some(entry) = self.cache.get(pointer).await {
                debug!(pointer = %pointer, "entity cache hit");
                return Ok(Some(entry.entity));
            }
        }

        match self.resolve(pointer).await? {
            Some(node) => Ok(self.decode_and_cache(kind, pointer, &node).await),
            None => {
                if freshness == Freshness::Refresh {
                    self.cache.invalidate(pointer).await;
                }
                Ok(None)
            }
        }
    }

    /// Decode raw fields delivered for `soul` as an entity of `kind`,
    /// caching the result.
    pub async fn entity_from_raw(
        &self,
        kind: EntityKind,
        soul: &GraphPointer,
        raw: RawNode,
    ) -> SyncResult<Option<Entity>> {
        let node = self.resolve_raw(soul, raw).await?;
        let key = match EntityKind::of_pointer(soul) {
            Some(_) => soul.clone(),
            None => kind.pointer(node.id())?,
        };
        Ok(self.decode_and_cache(kind, &key, &node).await)
    }

    pub async fn resolve_actor(&self, actor_id: &str, freshness: Freshness) -> SyncResult<Option<Actor>> {
        let pointer = EntityKind::Actor.pointer(actor_id)?;
        Ok(self
            .resolve_entity(&pointer, freshness)
            .await?
            .and_then(Entity::into_actor))
    }

    pub async fn resolve_game(&self, game_id: &str, freshness: Freshness) -> SyncResult<Option<Game>> {
        let pointer = EntityKind::Game.pointer(game_id)?;
        Ok(self
            .resolve_entity(&pointer, freshness)
            .await?
            .and_then(Entity::into_game))
    }

    async fn decode_and_cache(
        &self,
        kind: EntityKind,
        key: &GraphPointer,
        node: &ResolvedNode,
    ) -> Option<Entity> {
        match Entity::decode(kind, node) {
            Ok(entity) => {
                self.cache.put(key.clone(), entity.clone()).await;
                Some(entity)
            }
            Err(err) => {
                warn!(pointer = %key, %kind, error = %err, "entity failed to decode, treating as missing");
                None
            }
        }
    }
}

/// Scalar subset of `raw`; pointer fields become links, or cycle entries when
/// they lead back to a node visited in this call.
fn inline_subset(soul: &GraphPointer, raw: &RawNode, visited: &HashSet<&GraphPointer>) -> InlinedNode {
    let mut inlined = InlinedNode::new(soul.clone());
    let mut links = BTreeMap::new();
    let mut cycles = BTreeMap::new();

    for (name, value) in raw {
        match GraphValue::classify(value) {
            Ok(GraphValue::Inline(scalar)) => {
                inlined.fields.insert(name.clone(), scalar);
            }
            Ok(GraphValue::Pointer(target)) if visited.contains(&target) => {
                cycles.insert(name.clone(), target);
            }
            Ok(GraphValue::Pointer(target)) => {
                links.insert(name.clone(), target);
            }
            Err(err) => {
                warn!(soul = %soul, field = %name, error = %err, "skipping malformed inlined field");
            }
        }
    }

    inlined.links = links;
    inlined.cycles = cycles;
    inlined
}
