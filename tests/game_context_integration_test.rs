//! The view-facing facade: aggregate reads, joining and live game updates.

mod common;

use std::sync::Arc;

use common::{harness, ptr, seed_actor, seed_card, seed_game};
use polity::adapters::memory::InMemoryGraphStore;
use polity::domain::models::{ResolutionState, RawNode};
use polity::domain::ports::{GraphStore, HintStore};
use polity::SyncError;
use serde_json::json;
use tokio::sync::mpsc;

fn council() -> Arc<InMemoryGraphStore> {
    let store = Arc::new(InMemoryGraphStore::new());
    seed_game(&store, "g1", "Harbour Council");
    seed_card(&store, "g1", "c1", "Harbourmaster");
    seed_card(&store, "g1", "c2", "Fisher Guild");
    seed_actor(&store, "g1", "a1", "u1");
    store
}

#[tokio::test]
async fn test_game_context_aggregates_collections() {
    common::setup_test_logging();
    let store = council();
    let mut agreement = RawNode::new();
    agreement.insert("title".to_string(), json!("Shared moorings"));
    agreement.insert("status".to_string(), json!("proposed"));
    agreement.insert("proposer".to_string(), json!({"#": "actors/a1"}));
    store.seed_node(&ptr("agreements/ag1"), agreement);
    store.seed_node(&ptr("games/g1/agreements"), common::link("ag1", "agreements/ag1"));

    let view = harness(&store);
    let context = view.service.get_game_context("g1").await.unwrap().unwrap();

    assert_eq!(context.game.name.as_deref(), Some("Harbour Council"));
    assert_eq!(context.actors.len(), 1);
    assert_eq!(context.cards.len(), 2);
    assert_eq!(context.agreements.len(), 1);
    assert_eq!(context.agreements[0].proposer_id.as_deref(), Some("a1"));
    assert_eq!(context.reads.len(), 3);
}

#[tokio::test]
async fn test_missing_game_has_no_context() {
    let store = Arc::new(InMemoryGraphStore::new());
    let view = harness(&store);
    assert!(view.service.get_game_context("nowhere").await.unwrap().is_none());
    assert!(view.service.refresh_game("nowhere").await.unwrap().is_none());
}

#[tokio::test]
async fn test_join_game_creates_and_maps_an_actor_once() {
    let store = council();
    let view = harness(&store);

    let joined = view
        .service
        .join_game("g1", "u2", "c2", Some("Net Mender"))
        .await
        .unwrap();
    assert_eq!(joined.name.as_deref(), Some("Net Mender"));
    assert!(joined.belongs_to("g1", "u2"));
    assert_eq!(joined.card_id.as_deref(), Some("c2"));

    let again = view.service.join_game("g1", "u2", "c1", None).await.unwrap();
    assert_eq!(again.id, joined.id);

    let mapped = view.service.identity().mapped_actor("g1", "u2").await.unwrap();
    assert_eq!(mapped.as_deref(), Some(joined.id.as_str()));
    assert_eq!(view.hints.get("g1").await.unwrap(), Some(joined.id.clone()));

    let actors = store.get_once(&ptr("games/g1/actors")).await.unwrap().unwrap();
    assert_eq!(actors.len(), 2);
}

#[tokio::test]
async fn test_join_from_another_view_finds_existing_actor() {
    let store = council();
    let phone = harness(&store);
    let laptop = harness(&store);

    let joined = phone.service.join_game("g1", "u2", "c2", None).await.unwrap();
    assert_eq!(joined.name.as_deref(), Some("Fisher Guild"));

    let mine = laptop.service.resolve_my_actor("g1", "u2").await.unwrap();
    assert_eq!(mine.map(|actor| actor.id), Some(joined.id));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_joins_leave_one_actor() {
    let store = council();
    let phone = harness(&store);
    let laptop = harness(&store);

    let (first, second) = tokio::join!(
        phone.service.join_game("g1", "u2", "c2", None),
        laptop.service.join_game("g1", "u2", "c2", None),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.id, second.id);

    let mapped = phone.service.identity().mapped_actor("g1", "u2").await.unwrap();
    assert_eq!(mapped.as_deref(), Some(first.id.as_str()));

    let context = harness(&store).service.get_game_context("g1").await.unwrap().unwrap();
    let owned: Vec<_> = context
        .actors
        .iter()
        .filter(|actor| actor.belongs_to("g1", "u2"))
        .collect();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, first.id);
}

#[tokio::test]
async fn test_join_requires_existing_game_and_card() {
    let store = council();
    let view = harness(&store);

    let err = view.service.join_game("g9", "u2", "c1", None).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));

    let err = view.service.join_game("g1", "u2", "missing", None).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));
    assert_eq!(store.write_count(&ptr("games/g1/identity")), 0);
}

#[tokio::test]
async fn test_explain_my_actor_reports_visited_states() {
    let store = council();
    store.seed_node(&ptr("games/g1/identity"), common::node(json!({"u1": "a1"})));
    let view = harness(&store);

    let resolution = view.service.explain_my_actor("g1", "u1").await.unwrap();
    assert!(resolution.is_resolved());
    assert_eq!(resolution.trace.first(), Some(&ResolutionState::Start));
    assert_eq!(resolution.trace.last(), Some(&ResolutionState::Resolved));
    assert!(resolution.visited(ResolutionState::CheckAuthoritativeMap));
}

#[tokio::test]
async fn test_subscribe_to_game_until_cancelled() {
    let store = council();
    let view = harness(&store);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = view
        .service
        .subscribe_to_game("g1", move |game| {
            let _ = tx.send(game);
        })
        .await
        .unwrap();
    assert!(rx.recv().await.unwrap().is_some());
    assert_eq!(view.service.subscriptions().active_count(), 1);

    store.delete(&ptr("games/g1"));
    assert!(rx.recv().await.unwrap().is_none());

    subscription.cancel();
    assert!(!subscription.is_active());
    assert_eq!(view.service.subscriptions().active_count(), 0);
    assert_eq!(store.active_watch_count(), 0);
}
