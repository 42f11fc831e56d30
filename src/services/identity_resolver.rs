//! Identity resolver: (game, user) to the user's actor.
//!
//! Sources are consulted in priority order (local hint, entity cache,
//! authoritative mapping, direct query) and every candidate is validated
//! against the actor's owner and game before it is trusted. When the
//! mapping is missing or broken and a validated candidate exists, the
//! mapping is rewritten and confirmed by reading it back after a settle
//! delay; racing writers therefore converge on the last-write-wins winner.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::models::{
    Actor, ActorResolution, EntityKind, GraphPointer, GraphValue, IdentityConfig, RawNode,
    RepairOutcome, ResolutionOutcome, ResolutionSource, ResolutionState, Scalar,
};
use crate::domain::ports::HintStore;
use crate::services::bounded_read::BoundedReadCoordinator;
use crate::services::reference_resolver::{Freshness, ReferenceResolver};
use crate::services::retry::RetryPolicy;

/// Store paths an identity lookup needs for one game.
struct GamePaths {
    identity: GraphPointer,
    actors: GraphPointer,
}

/// Walks the resolution states, recording each one entered.
struct Walk {
    trace: Vec<ResolutionState>,
}

impl Walk {
    fn start() -> Self {
        Self {
            trace: vec![ResolutionState::Start],
        }
    }

    fn enter(&mut self, state: ResolutionState) {
        debug!(state = %state, "identity resolution state");
        self.trace.push(state);
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    resolver: ReferenceResolver,
    reads: BoundedReadCoordinator,
    hints: Arc<dyn HintStore>,
    retry: RetryPolicy,
    config: IdentityConfig,
}

impl IdentityResolver {
    pub fn new(
        resolver: ReferenceResolver,
        reads: BoundedReadCoordinator,
        hints: Arc<dyn HintStore>,
        retry: RetryPolicy,
        config: IdentityConfig,
    ) -> Self {
        Self {
            resolver,
            reads,
            hints,
            retry,
            config,
        }
    }

    /// Find the actor `user_id` plays in `game_id`.
    ///
    /// Exhaustion is an `Unresolved` outcome; only an unavailable store or a
    /// malformed id is an error.
    #[instrument(skip(self), fields(game = %game_id, user = %user_id))]
    pub async fn resolve_actor(&self, game_id: &str, user_id: &str) -> SyncResult<ActorResolution> {
        let mut walk = Walk::start();
        let paths = self.game_paths(game_id).await?;

        walk.enter(ResolutionState::CheckHint);
        let hinted = self.hints.get(game_id).await.unwrap_or_else(|err| {
            warn!(error = %err, "hint store unreadable, ignoring hint");
            None
        });
        let mut candidate: Option<(Actor, ResolutionSource)> = None;
        if let Some(actor_id) = &hinted {
            match self.validate_candidate(game_id, user_id, actor_id).await? {
                Some(actor) => candidate = Some((actor, ResolutionSource::Hint)),
                None => {
                    warn!(hint = %actor_id, "hint does not name this user's actor, discarding");
                    self.discard_hint(game_id).await;
                }
            }
        }

        walk.enter(ResolutionState::CheckCache);
        if candidate.is_none() {
            let owned = self
                .resolver
                .cache()
                .actors_in_game(game_id)
                .await
                .into_iter()
                .filter(|actor| actor.is_owned_by(user_id))
                .collect();
            candidate = earliest(owned).map(|actor| (actor, ResolutionSource::Cache));
        }

        walk.enter(ResolutionState::CheckAuthoritativeMap);
        let mapped = self.read_mapping(&paths.identity, user_id).await?;

        if let Some(mapped_id) = &mapped {
            if let Some((actor, source)) = candidate.as_ref().filter(|(a, _)| &a.id == mapped_id) {
                let (actor, source) = (actor.clone(), *source);
                return Ok(self.finish(walk, game_id, user_id, Some((actor, source))).await);
            }

            walk.enter(ResolutionState::DirectQueryWithRetry);
            let label = format!("identity.direct_query:{mapped_id}");
            let queried = self
                .retry
                .run(&label, |_| self.resolver.resolve_actor(mapped_id, Freshness::Refresh))
                .await?;

            match queried {
                Some(actor) if actor.belongs_to(game_id, user_id) => {
                    let resolved = Some((actor, ResolutionSource::AuthoritativeMap));
                    return Ok(self.finish(walk, game_id, user_id, resolved).await);
                }
                _ => {
                    let err = SyncError::InvalidMapping {
                        game_id: game_id.to_string(),
                        user_id: user_id.to_string(),
                        actor_id: mapped_id.clone(),
                    };
                    warn!(error = %err, "authoritative mapping is invalid");
                    if hinted.as_deref() == Some(mapped_id.as_str()) {
                        self.discard_hint(game_id).await;
                    }
                    candidate = candidate.filter(|(a, _)| &a.id != mapped_id);
                }
            }
        }

        walk.enter(ResolutionState::RepairAndRetry);
        if candidate.is_none() && mapped.is_none() && self.config.scan_collection_on_miss {
            candidate = self
                .scan_actors(&paths.actors, game_id, user_id)
                .await?
                .map(|actor| (actor, ResolutionSource::CollectionScan));
        }

        let Some((found, source)) = candidate else {
            debug!("no validated candidate, skipping repair");
            return Ok(self.finish(walk, game_id, user_id, None).await);
        };

        // Hint and cache candidates may be stale; only a fresh read may drive a write.
        let Some(candidate) = self.revalidate(game_id, user_id, &found.id).await? else {
            warn!(actor = %found.id, ?source, "candidate is gone from the store, skipping repair");
            if hinted.as_deref() == Some(found.id.as_str()) {
                self.discard_hint(game_id).await;
            }
            return Ok(self.finish(walk, game_id, user_id, None).await);
        };

        let source = match source {
            ResolutionSource::CollectionScan => ResolutionSource::CollectionScan,
            _ => ResolutionSource::Repair,
        };
        let resolved = match self.write_and_confirm(game_id, user_id, &paths.identity, &candidate.id).await {
            Ok(RepairOutcome::Confirmed { actor_id }) => self
                .revalidate(game_id, user_id, &actor_id)
                .await?
                .map(|actor| (actor, source)),
            Ok(RepairOutcome::Superseded { requested, winner }) => {
                info!(requested = %requested, winner = %winner, "concurrent repair won, adopting its actor");
                self.revalidate(game_id, user_id, &winner)
                    .await?
                    .map(|actor| (actor, ResolutionSource::Repair))
            }
            Ok(RepairOutcome::Rejected { reason }) => {
                warn!(reason = %reason, "repair rejected");
                None
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(error = %err, "repair write failed");
                None
            }
        };

        Ok(self.finish(walk, game_id, user_id, resolved).await)
    }

    /// Point the mapping for (`game_id`, `user_id`) at `actor_id`, after
    /// checking that the actor is that user's actor in that game.
    ///
    /// Repeating a confirmed repair is a no-op that confirms again.
    #[instrument(skip(self), fields(game = %game_id, user = %user_id, actor = %actor_id))]
    pub async fn repair_mapping(
        &self,
        game_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> SyncResult<RepairOutcome> {
        let paths = self.game_paths(game_id).await?;
        match self.resolver.resolve_actor(actor_id, Freshness::Refresh).await? {
            None => Ok(RepairOutcome::Rejected {
                reason: format!("actor {actor_id} does not exist"),
            }),
            Some(actor) if !actor.belongs_to(game_id, user_id) => Ok(RepairOutcome::Rejected {
                reason: format!("actor {actor_id} is not user {user_id}'s actor in game {game_id}"),
            }),
            Some(_) => {
                self.write_and_confirm(game_id, user_id, &paths.identity, actor_id)
                    .await
            }
        }
    }

    /// Actor id the authoritative mapping currently names for `user_id`.
    pub async fn mapped_actor(&self, game_id: &str, user_id: &str) -> SyncResult<Option<String>> {
        let paths = self.game_paths(game_id).await?;
        self.read_mapping(&paths.identity, user_id).await
    }

    async fn game_paths(&self, game_id: &str) -> SyncResult<GamePaths> {
        if let Some(game) = self.resolver.resolve_game(game_id, Freshness::Cached).await? {
            return Ok(GamePaths {
                identity: game.identity,
                actors: game.actors,
            });
        }
        let root = EntityKind::Game.pointer(game_id)?;
        Ok(GamePaths {
            identity: root.child("identity")?,
            actors: root.child("actors")?,
        })
    }

    async fn read_mapping(&self, identity: &GraphPointer, user_id: &str) -> SyncResult<Option<String>> {
        let node = self.resolver.store().get_once(identity).await?;
        Ok(node
            .as_ref()
            .and_then(|node| node.get(user_id))
            .and_then(|value| mapped_actor_id(identity, user_id, value)))
    }

    async fn validate_candidate(
        &self,
        game_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> SyncResult<Option<Actor>> {
        match self.resolver.resolve_actor(actor_id, Freshness::Cached).await {
            Ok(actor) => Ok(actor.filter(|a| a.belongs_to(game_id, user_id))),
            Err(err) if matches!(err, SyncError::MalformedPointer { .. }) => {
                debug!(error = %err, "candidate id is not a valid actor id");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn revalidate(&self, game_id: &str, user_id: &str, actor_id: &str) -> SyncResult<Option<Actor>> {
        let actor = self.resolver.resolve_actor(actor_id, Freshness::Refresh).await?;
        Ok(actor.filter(|a| a.belongs_to(game_id, user_id)))
    }

    async fn scan_actors(
        &self,
        actors: &GraphPointer,
        game_id: &str,
        user_id: &str,
    ) -> SyncResult<Option<Actor>> {
        let read = self.reads.read_collection(actors, None).await?;
        let owned: Vec<Actor> = read
            .items
            .into_iter()
            .filter_map(|entity| entity.into_actor())
            .filter(|actor| actor.belongs_to(game_id, user_id))
            .collect();
        debug!(found = owned.len(), "scanned actors collection");
        Ok(earliest(owned))
    }

    async fn write_and_confirm(
        &self,
        game_id: &str,
        user_id: &str,
        identity: &GraphPointer,
        actor_id: &str,
    ) -> SyncResult<RepairOutcome> {
        if self.read_mapping(identity, user_id).await?.as_deref() == Some(actor_id) {
            debug!("mapping already names this actor");
            return Ok(RepairOutcome::Confirmed {
                actor_id: actor_id.to_string(),
            });
        }

        let mut patch = RawNode::new();
        patch.insert(user_id.to_string(), Value::String(actor_id.to_string()));
        self.resolver.store().write(identity, patch).await?;

        sleep(Duration::from_millis(self.config.repair_settle_ms)).await;

        match self.read_mapping(identity, user_id).await? {
            Some(current) if current == actor_id => {
                info!(game = %game_id, user = %user_id, actor = %actor_id, "identity mapping repaired");
                Ok(RepairOutcome::Confirmed { actor_id: current })
            }
            Some(winner) => Ok(RepairOutcome::Superseded {
                requested: actor_id.to_string(),
                winner,
            }),
            None => Err(SyncError::WriteFailed {
                path: identity.to_string(),
                reason: "mapping not visible after settle delay".to_string(),
            }),
        }
    }

    async fn discard_hint(&self, game_id: &str) {
        if let Err(err) = self.hints.remove(game_id).await {
            warn!(game = %game_id, error = %err, "failed to remove hint");
        }
    }

    async fn finish(
        &self,
        mut walk: Walk,
        game_id: &str,
        user_id: &str,
        resolved: Option<(Actor, ResolutionSource)>,
    ) -> ActorResolution {
        let outcome = match resolved {
            Some((actor, source)) => {
                walk.enter(ResolutionState::Resolved);
                if let Err(err) = self.hints.set(game_id, &actor.id).await {
                    warn!(game = %game_id, error = %err, "failed to store hint");
                }
                info!(actor = %actor.id, ?source, "actor resolved");
                ResolutionOutcome::Resolved { actor, source }
            }
            None => {
                walk.enter(ResolutionState::Unresolved);
                info!("actor unresolved");
                ResolutionOutcome::Unresolved
            }
        };

        ActorResolution {
            game_id: game_id.to_string(),
            user_id: user_id.to_string(),
            outcome,
            trace: walk.trace,
        }
    }
}

/// Earliest-created actor, smallest id on ties, so every resolver picks the
/// same one.
fn earliest(mut actors: Vec<Actor>) -> Option<Actor> {
    actors.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    actors.into_iter().next()
}

/// Actor id held by a mapping field: a text id or a pointer to an actor.
fn mapped_actor_id(identity: &GraphPointer, user_id: &str, value: &Value) -> Option<String> {
    match GraphValue::classify(value) {
        Ok(GraphValue::Inline(Scalar::Text(id))) if !id.is_empty() => match EntityKind::Actor.pointer(&id) {
            Ok(_) => Some(id),
            Err(err) => {
                warn!(mapping = %identity, user = %user_id, error = %err, "mapping entry is not a valid actor id");
                None
            }
        },
        Ok(GraphValue::Inline(Scalar::Null)) => None,
        Ok(GraphValue::Pointer(target)) if EntityKind::of_pointer(&target) == Some(EntityKind::Actor) => {
            Some(target.last_segment().to_string())
        }
        Ok(other) => {
            warn!(mapping = %identity, user = %user_id, value = ?other, "mapping entry is not an actor id");
            None
        }
        Err(err) => {
            warn!(mapping = %identity, user = %user_id, error = %err, "malformed mapping entry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::MokaEntityCache;
    use crate::adapters::hints::InMemoryHintStore;
    use crate::adapters::memory::InMemoryGraphStore;
    use crate::domain::models::ReadConfig;
    use serde_json::json;

    fn ptr(raw: &str) -> GraphPointer {
        GraphPointer::parse(raw).unwrap()
    }

    fn node(value: Value) -> RawNode {
        value.as_object().cloned().unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryGraphStore>,
        hints: Arc<InMemoryHintStore>,
        identity: IdentityResolver,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryGraphStore::new());
        store.seed_node(&ptr("games/g1"), node(json!({"name": "Harbour Council"})));
        let hints = Arc::new(InMemoryHintStore::new());
        let resolver = ReferenceResolver::new(store.clone(), Arc::new(MokaEntityCache::new()));
        let reads = BoundedReadCoordinator::new(
            resolver.clone(),
            ReadConfig {
                convergence_window_ms: 30,
                ..ReadConfig::default()
            },
        );
        let retry = RetryPolicy::new(2, Duration::from_millis(5), Duration::from_millis(10));
        let config = IdentityConfig {
            repair_settle_ms: 5,
            scan_collection_on_miss: true,
        };
        let identity = IdentityResolver::new(resolver, reads, hints.clone(), retry, config);
        Fixture { store, hints, identity }
    }

    fn seed_actor(store: &InMemoryGraphStore, id: &str, user: &str) {
        store.seed_node(
            &ptr(&format!("actors/{id}")),
            node(json!({"game_id": "g1", "user_id": user, "name": id})),
        );
    }

    #[tokio::test]
    async fn test_mapping_resolves_directly() {
        let f = fixture();
        seed_actor(&f.store, "a1", "u1");
        f.store.seed_node(&ptr("games/g1/identity"), node(json!({"u1": "a1"})));

        let resolution = f.identity.resolve_actor("g1", "u1").await.unwrap();
        assert_eq!(resolution.actor().unwrap().id, "a1");
        assert_eq!(resolution.source(), Some(ResolutionSource::AuthoritativeMap));
        assert_eq!(f.hints.get("g1").await.unwrap().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_pointer_mapping_is_accepted() {
        let f = fixture();
        seed_actor(&f.store, "a1", "u1");
        f.store
            .seed_node(&ptr("games/g1/identity"), node(json!({"u1": {"#": "actors/a1"}})));

        let resolution = f.identity.resolve_actor("g1", "u1").await.unwrap();
        assert_eq!(resolution.actor().unwrap().id, "a1");
    }

    #[tokio::test]
    async fn test_hint_with_mapping_skips_direct_query() {
        let f = fixture();
        seed_actor(&f.store, "a1", "u1");
        f.store.seed_node(&ptr("games/g1/identity"), node(json!({"u1": "a1"})));
        f.hints.set("g1", "a1").await.unwrap();

        let resolution = f.identity.resolve_actor("g1", "u1").await.unwrap();
        assert_eq!(resolution.source(), Some(ResolutionSource::Hint));
        assert!(!resolution.visited(ResolutionState::DirectQueryWithRetry));
    }

    #[tokio::test]
    async fn test_collection_scan_repairs_missing_mapping() {
        let f = fixture();
        seed_actor(&f.store, "a1", "u1");
        f.store
            .seed_node(&ptr("games/g1/actors"), node(json!({"a1": {"#": "actors/a1"}})));

        let resolution = f.identity.resolve_actor("g1", "u1").await.unwrap();
        assert_eq!(resolution.source(), Some(ResolutionSource::CollectionScan));
        assert_eq!(
            f.identity.mapped_actor("g1", "u1").await.unwrap().as_deref(),
            Some("a1")
        );
    }

    #[tokio::test]
    async fn test_nothing_known_is_unresolved_without_write() {
        let f = fixture();
        let resolution = f.identity.resolve_actor("g1", "u1").await.unwrap();
        assert!(!resolution.is_resolved());
        assert_eq!(resolution.trace.last(), Some(&ResolutionState::Unresolved));
        assert_eq!(f.store.write_count(&ptr("games/g1/identity")), 0);
    }

    #[tokio::test]
    async fn test_repair_rejects_foreign_actor() {
        let f = fixture();
        seed_actor(&f.store, "a2", "u2");

        let outcome = f.identity.repair_mapping("g1", "u1", "a2").await.unwrap();
        assert!(matches!(outcome, RepairOutcome::Rejected { .. }));
        assert_eq!(f.store.write_count(&ptr("games/g1/identity")), 0);
    }

    #[tokio::test]
    async fn test_repeated_repair_writes_once() {
        let f = fixture();
        seed_actor(&f.store, "a1", "u1");

        let first = f.identity.repair_mapping("g1", "u1", "a1").await.unwrap();
        let second = f.identity.repair_mapping("g1", "u1", "a1").await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_success());
        assert_eq!(f.store.write_count(&ptr("games/g1/identity")), 1);
    }

    #[tokio::test]
    async fn test_unparseable_mapping_falls_through_to_hint_repair() {
        let f = fixture();
        seed_actor(&f.store, "a1", "u1");
        f.store.seed_node(&ptr("games/g1/identity"), node(json!({"u1": "bad id"})));
        f.hints.set("g1", "a1").await.unwrap();

        let resolution = f.identity.resolve_actor("g1", "u1").await.unwrap();
        assert_eq!(resolution.actor().unwrap().id, "a1");
        assert_eq!(resolution.source(), Some(ResolutionSource::Repair));
        assert_eq!(
            f.identity.mapped_actor("g1", "u1").await.unwrap().as_deref(),
            Some("a1")
        );
    }

    #[tokio::test]
    async fn test_unparseable_mapping_without_candidate_is_unresolved() {
        let f = fixture();
        f.store.seed_node(&ptr("games/g1/identity"), node(json!({"u1": "bad id"})));

        let resolution = f.identity.resolve_actor("g1", "u1").await.unwrap();
        assert!(!resolution.is_resolved());
        assert_eq!(f.store.write_count(&ptr("games/g1/identity")), 0);
    }

    #[tokio::test]
    async fn test_stale_cached_actor_is_not_written_to_mapping() {
        let f = fixture();
        seed_actor(&f.store, "a1", "u1");
        f.identity
            .resolver
            .resolve_actor("a1", Freshness::Cached)
            .await
            .unwrap()
            .unwrap();
        f.store.delete(&ptr("actors/a1"));

        let resolution = f.identity.resolve_actor("g1", "u1").await.unwrap();
        assert!(!resolution.is_resolved());
        assert_eq!(f.store.write_count(&ptr("games/g1/identity")), 0);
        assert!(f.identity.mapped_actor("g1", "u1").await.unwrap().is_none());
    }

    #[test]
    fn test_mapping_entry_shapes() {
        let identity = ptr("games/g1/identity");
        assert_eq!(mapped_actor_id(&identity, "u1", &json!("a1")).as_deref(), Some("a1"));
        assert_eq!(
            mapped_actor_id(&identity, "u1", &json!({"#": "actors/a1"})).as_deref(),
            Some("a1")
        );
        assert!(mapped_actor_id(&identity, "u1", &json!({"#": "cards/c1"})).is_none());
        assert!(mapped_actor_id(&identity, "u1", &json!(7)).is_none());
        assert!(mapped_actor_id(&identity, "u1", &json!([1])).is_none());
        assert!(mapped_actor_id(&identity, "u1", &json!("bad id")).is_none());
        assert!(mapped_actor_id(&identity, "u1", &json!("a/b")).is_none());
    }

    #[test]
    fn test_earliest_prefers_creation_time_then_id() {
        let actor = |id: &str, created_ms: Option<i64>| Actor {
            id: id.to_string(),
            game_id: Some("g1".to_string()),
            user_id: Some("u1".to_string()),
            name: None,
            card_id: None,
            card: None,
            created_at: created_ms.and_then(chrono::DateTime::from_timestamp_millis),
        };

        let picked = earliest(vec![actor("b", Some(2_000)), actor("c", Some(1_000))]);
        assert_eq!(picked.unwrap().id, "c");

        let picked = earliest(vec![actor("z", Some(1_000)), actor("m", Some(1_000))]);
        assert_eq!(picked.unwrap().id, "m");

        assert!(earliest(Vec::new()).is_none());
    }
}
