//! Game context facade exposed to the view layer.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::models::{
    Actor, ActorResolution, Config, Entity, EntityKind, Game, GameCollection, GameContext,
    RawNode, RepairOutcome,
};
use crate::domain::ports::{EntityCache, GraphStore, HintStore};
use crate::services::bounded_read::BoundedReadCoordinator;
use crate::services::identity_resolver::IdentityResolver;
use crate::services::reference_resolver::{Freshness, ReferenceResolver};
use crate::services::retry::RetryPolicy;
use crate::services::subscription_manager::{Subscription, SubscriptionManager};

/// Entry point for views: aggregate reads, "my actor", live game updates,
/// identity repair and the join flow.
#[derive(Clone)]
pub struct GameContextService {
    resolver: ReferenceResolver,
    reads: BoundedReadCoordinator,
    identity: IdentityResolver,
    subscriptions: SubscriptionManager,
    hints: Arc<dyn HintStore>,
}

impl GameContextService {
    pub fn new(
        store: Arc<dyn GraphStore>,
        cache: Arc<dyn EntityCache>,
        hints: Arc<dyn HintStore>,
        config: &Config,
    ) -> Self {
        let resolver = ReferenceResolver::new(store, cache);
        let reads = BoundedReadCoordinator::new(resolver.clone(), config.reads.clone());
        let identity = IdentityResolver::new(
            resolver.clone(),
            reads.clone(),
            Arc::clone(&hints),
            RetryPolicy::from_config(&config.retry),
            config.identity.clone(),
        );
        let subscriptions = SubscriptionManager::new(resolver.clone());
        Self {
            resolver,
            reads,
            identity,
            subscriptions,
            hints,
        }
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    pub fn reads(&self) -> &BoundedReadCoordinator {
        &self.reads
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Game record plus its actors, cards and agreements.
    ///
    /// `Ok(None)` when the game record has not replicated (or does not exist).
    /// Collections are lower-bound snapshots.
    #[instrument(skip(self))]
    pub async fn get_game_context(&self, game_id: &str) -> SyncResult<Option<GameContext>> {
        self.load_context(game_id, Freshness::Cached).await
    }

    /// Same as [`get_game_context`](Self::get_game_context) but the game
    /// record bypasses the cache.
    #[instrument(skip(self))]
    pub async fn refresh_game(&self, game_id: &str) -> SyncResult<Option<GameContext>> {
        self.load_context(game_id, Freshness::Refresh).await
    }

    #[instrument(skip(self))]
    pub async fn resolve_my_actor(&self, game_id: &str, user_id: &str) -> SyncResult<Option<Actor>> {
        Ok(self.identity.resolve_actor(game_id, user_id).await?.into_actor())
    }

    /// Full identity resolution outcome, including the visited states.
    pub async fn explain_my_actor(&self, game_id: &str, user_id: &str) -> SyncResult<ActorResolution> {
        self.identity.resolve_actor(game_id, user_id).await
    }

    /// Call `on_update` with every new version of the game record until the
    /// returned subscription is cancelled.
    pub async fn subscribe_to_game<F>(&self, game_id: &str, on_update: F) -> SyncResult<Subscription>
    where
        F: Fn(Option<Game>) + Send + Sync + 'static,
    {
        let pointer = EntityKind::Game.pointer(game_id)?;
        self.subscriptions
            .subscribe(&pointer, move |entity| on_update(entity.and_then(Entity::into_game)))
            .await
    }

    /// Point the mapping for (`game_id`, `user_id`) at `actor_id`. A
    /// confirmed repair also stores the hint.
    #[instrument(skip(self))]
    pub async fn repair_identity_mapping(
        &self,
        game_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> SyncResult<RepairOutcome> {
        let outcome = self.identity.repair_mapping(game_id, user_id, actor_id).await?;
        if outcome.is_success() {
            self.hints.set(game_id, actor_id).await?;
        }
        Ok(outcome)
    }

    /// Give `user_id` an actor in `game_id` backed by `card_id`.
    ///
    /// Idempotent per (game, user): an actor that already resolves is
    /// returned unchanged. Otherwise the actor node is written, linked into
    /// the game's actors collection and mapped through the repair path.
    #[instrument(skip(self))]
    pub async fn join_game(
        &self,
        game_id: &str,
        user_id: &str,
        card_id: &str,
        name: Option<&str>,
    ) -> SyncResult<Actor> {
        let game = self
            .resolver
            .resolve_game(game_id, Freshness::Refresh)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                pointer: format!("games/{game_id}"),
            })?;

        if let Some(actor) = self.identity.resolve_actor(game_id, user_id).await?.into_actor() {
            info!(actor = %actor.id, "user already has an actor in this game");
            return Ok(actor);
        }

        let card_pointer = EntityKind::Card.pointer(card_id)?;
        let card = self
            .resolver
            .resolve_entity(&card_pointer, Freshness::Cached)
            .await?
            .and_then(Entity::into_card)
            .ok_or_else(|| SyncError::NotFound {
                pointer: card_pointer.to_string(),
            })?;

        let actor_id = Uuid::new_v4().to_string();
        let actor_pointer = EntityKind::Actor.pointer(&actor_id)?;
        let display_name = name
            .map(str::to_string)
            .or(card.title)
            .unwrap_or_else(|| user_id.to_string());

        let store = self.resolver.store();
        store
            .write(
                &actor_pointer,
                raw(json!({
                    "game_id": game_id,
                    "user_id": user_id,
                    "name": display_name,
                    "card": card_pointer.to_raw(),
                    "created_at": Utc::now().timestamp_millis(),
                })),
            )
            .await?;

        let mut link = RawNode::new();
        link.insert(actor_id.clone(), actor_pointer.to_raw());
        store.write(game.collection(GameCollection::Actors), link).await?;

        if let Some(existing) = self.mapped_live_actor(game_id, user_id).await? {
            info!(actor = %existing.id, "another device joined first, using its actor");
            self.retract_actor(&game, &actor_id).await?;
            self.hints.set(game_id, &existing.id).await?;
            return Ok(existing);
        }

        let chosen = match self.identity.repair_mapping(game_id, user_id, &actor_id).await? {
            RepairOutcome::Confirmed { actor_id } => actor_id,
            RepairOutcome::Superseded { requested, winner } => {
                warn!(requested = %requested, winner = %winner, "concurrent join won, using its actor");
                self.retract_actor(&game, &requested).await?;
                winner
            }
            RepairOutcome::Rejected { reason } => {
                warn!(reason = %reason, "new actor was rejected by the mapping repair");
                return Err(SyncError::InvalidMapping {
                    game_id: game_id.to_string(),
                    user_id: user_id.to_string(),
                    actor_id,
                });
            }
        };

        self.hints.set(game_id, &chosen).await?;
        self.resolver
            .resolve_actor(&chosen, Freshness::Refresh)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                pointer: format!("actors/{chosen}"),
            })
    }

    /// Actor the mapping names for `user_id`, if it still exists and is theirs.
    async fn mapped_live_actor(&self, game_id: &str, user_id: &str) -> SyncResult<Option<Actor>> {
        let Some(mapped) = self.identity.mapped_actor(game_id, user_id).await? else {
            return Ok(None);
        };
        Ok(self
            .resolver
            .resolve_actor(&mapped, Freshness::Refresh)
            .await?
            .filter(|actor| actor.belongs_to(game_id, user_id)))
    }

    /// Tombstone an actor this device created and unlink it from the game.
    async fn retract_actor(&self, game: &Game, actor_id: &str) -> SyncResult<()> {
        let pointer = EntityKind::Actor.pointer(actor_id)?;
        let store = self.resolver.store();
        if let Some(fields) = store.get_once(&pointer).await? {
            let tombstone: RawNode = fields.into_iter().map(|(key, _)| (key, Value::Null)).collect();
            store.write(&pointer, tombstone).await?;
        }

        let mut unlink = RawNode::new();
        unlink.insert(actor_id.to_string(), Value::Null);
        store.write(game.collection(GameCollection::Actors), unlink).await?;
        self.resolver.cache().invalidate(&pointer).await;
        info!(actor = %actor_id, "retracted duplicate actor");
        Ok(())
    }

    async fn load_context(&self, game_id: &str, freshness: Freshness) -> SyncResult<Option<GameContext>> {
        let Some(game) = self.resolver.resolve_game(game_id, freshness).await? else {
            return Ok(None);
        };

        let (actors, cards, agreements) = tokio::join!(
            self.reads.read_collection(game.collection(GameCollection::Actors), None),
            self.reads.read_collection(game.collection(GameCollection::Cards), None),
            self.reads.read_collection(game.collection(GameCollection::Agreements), None),
        );
        let (actors, cards, agreements) = (actors?, cards?, agreements?);

        let reads = vec![actors.summary(), cards.summary(), agreements.summary()];
        info!(
            game = %game.id,
            actors = actors.len(),
            cards = cards.len(),
            agreements = agreements.len(),
            "game context loaded"
        );

        Ok(Some(GameContext {
            game,
            actors: actors.items.into_iter().filter_map(Entity::into_actor).collect(),
            cards: cards.items.into_iter().filter_map(Entity::into_card).collect(),
            agreements: agreements
                .items
                .into_iter()
                .filter_map(Entity::into_agreement)
                .collect(),
            reads,
        }))
    }
}

fn raw(value: Value) -> RawNode {
    match value {
        Value::Object(map) => map,
        _ => RawNode::new(),
    }
}
