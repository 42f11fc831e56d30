//! Common test utilities for integration tests
//!
//! Provides shared fixtures for seeding a local peer with games, actors and
//! cards, and for wiring services over it with short windows.

#![allow(dead_code)]

use std::sync::Arc;

use polity::adapters::cache::MokaEntityCache;
use polity::adapters::hints::InMemoryHintStore;
use polity::adapters::memory::InMemoryGraphStore;
use polity::domain::models::{Config, GraphPointer, RawNode};
use polity::services::GameContextService;
use serde_json::{json, Value};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn ptr(raw: &str) -> GraphPointer {
    GraphPointer::parse(raw).expect("valid pointer")
}

pub fn node(value: Value) -> RawNode {
    value.as_object().cloned().expect("object node")
}

pub fn link(key: &str, target: &str) -> RawNode {
    let mut patch = RawNode::new();
    patch.insert(key.to_string(), json!({ "#": target }));
    patch
}

/// Config with windows and delays short enough for tests.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.reads.convergence_window_ms = 40;
    config.retry.max_attempts = 2;
    config.retry.initial_backoff_ms = 5;
    config.retry.max_backoff_ms = 10;
    config.identity.repair_settle_ms = 5;
    config
}

pub fn seed_game(store: &InMemoryGraphStore, game_id: &str, name: &str) {
    store.seed_node(
        &ptr(&format!("games/{game_id}")),
        node(json!({ "name": name, "status": "open" })),
    );
}

/// Seed an actor node and link it into its game's actors collection.
pub fn seed_actor(store: &InMemoryGraphStore, game_id: &str, actor_id: &str, user_id: &str) {
    store.seed_node(
        &ptr(&format!("actors/{actor_id}")),
        node(json!({
            "game_id": game_id,
            "user_id": user_id,
            "name": format!("{actor_id} of {user_id}"),
        })),
    );
    store.seed_node(
        &ptr(&format!("games/{game_id}/actors")),
        link(actor_id, &format!("actors/{actor_id}")),
    );
}

pub fn seed_card(store: &InMemoryGraphStore, game_id: &str, card_id: &str, title: &str) {
    store.seed_node(
        &ptr(&format!("cards/{card_id}")),
        node(json!({ "title": title, "role": "delegate" })),
    );
    store.seed_node(
        &ptr(&format!("games/{game_id}/cards")),
        link(card_id, &format!("cards/{card_id}")),
    );
}

pub struct Harness {
    pub store: Arc<InMemoryGraphStore>,
    pub hints: Arc<InMemoryHintStore>,
    pub service: GameContextService,
}

/// A service with its own cache and hints over `store`, as a second view or
/// device of the same user would have.
pub fn harness(store: &Arc<InMemoryGraphStore>) -> Harness {
    let hints = Arc::new(InMemoryHintStore::new());
    let service = GameContextService::new(
        store.clone(),
        Arc::new(MokaEntityCache::new()),
        hints.clone(),
        &fast_config(),
    );
    Harness {
        store: store.clone(),
        hints,
        service,
    }
}
