//! Bounded read coordinator.
//!
//! The store's child enumeration never says "done". A bounded read opens a
//! child watch, accumulates whatever arrives for one convergence window, then
//! releases the watch and returns what it has: a lower-bound snapshot.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::Value;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::domain::errors::SyncResult;
use crate::domain::models::{
    CollectionRead, Completeness, Entity, EntityKind, GraphPointer, GraphValue, ReadConfig,
    POINTER_KEY,
};
use crate::domain::ports::{ensure_ready, ChildUpdate};
use crate::services::reference_resolver::{Freshness, ReferenceResolver};
use crate::services::retry::RetryPolicy;

type PendingResolution = BoxFuture<'static, (String, u64, SyncResult<Option<Entity>>)>;

#[derive(Clone)]
pub struct BoundedReadCoordinator {
    resolver: ReferenceResolver,
    config: ReadConfig,
}

/// Per-call accumulator: arrival order plus the latest resolved version of
/// each child key.
#[derive(Default)]
struct Accumulator {
    order: Vec<String>,
    items: HashMap<String, Entity>,
    /// Bumped on every delivery of a key so stale resolutions are ignored.
    generations: HashMap<String, u64>,
}

impl Accumulator {
    fn arrive(&mut self, key: &str) -> u64 {
        if !self.generations.contains_key(key) {
            self.order.push(key.to_string());
        }
        let generation = self.generations.entry(key.to_string()).or_default();
        *generation += 1;
        *generation
    }

    fn tombstone(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.items.remove(key);
        self.generations.remove(key);
    }

    fn settle(&mut self, key: String, generation: u64, entity: Entity) {
        if self.generations.get(&key) == Some(&generation) {
            self.items.insert(key, entity);
        }
    }

    fn into_items(mut self) -> Vec<Entity> {
        self.order
            .iter()
            .filter_map(|key| self.items.remove(key))
            .collect()
    }
}

impl BoundedReadCoordinator {
    pub fn new(resolver: ReferenceResolver, config: ReadConfig) -> Self {
        Self { resolver, config }
    }

    /// Convergence window for a collection, keyed by its last path segment.
    pub fn window_for(&self, root: &GraphPointer) -> Duration {
        self.config.window_for(root.last_segment())
    }

    /// Read every child of `root` that arrives within the collection's window.
    pub async fn read_collection(
        &self,
        root: &GraphPointer,
        expected: Option<usize>,
    ) -> SyncResult<CollectionRead> {
        self.read_collection_with_window(root, expected, self.window_for(root))
            .await
    }

    /// Single-window read with an explicit budget.
    ///
    /// Fails fast with `StoreUnavailable` when the store is not ready. Child
    /// resolutions still outstanding when the window closes are left out.
    pub async fn read_collection_with_window(
        &self,
        root: &GraphPointer,
        expected: Option<usize>,
        window: Duration,
    ) -> SyncResult<CollectionRead> {
        let store = self.resolver.store();
        ensure_ready(store.as_ref())?;

        let started = Instant::now();
        let deadline = started + window;
        let mut watch = store.watch_children(root).await?;
        let item_kind = EntityKind::from_root(root.last_segment());

        let mut acc = Accumulator::default();
        let mut pending: FuturesUnordered<PendingResolution> = FuturesUnordered::new();
        let mut open = true;
        let timer = sleep_until(deadline);
        tokio::pin!(timer);

        let outcome: SyncResult<()> = loop {
            if !open && pending.is_empty() {
                break Ok(());
            }
            tokio::select! {
                () = &mut timer => break Ok(()),
                update = watch.events.recv(), if open => match update {
                    Some(update) => {
                        if let Some(resolution) = self.accept_child(root, item_kind, update, &mut acc) {
                            pending.push(resolution);
                        }
                    }
                    None => open = false,
                },
                Some((key, generation, result)) = pending.next(), if !pending.is_empty() => {
                    match result {
                        Ok(Some(entity)) => acc.settle(key, generation, entity),
                        Ok(None) => debug!(root = %root, child = %key, "child not resolvable yet"),
                        Err(err) if err.is_fatal() => break Err(err),
                        Err(err) => warn!(root = %root, child = %key, error = %err, "child failed to resolve"),
                    }
                }
            }
        };

        store.unwatch(watch.id);
        outcome?;

        if !pending.is_empty() {
            debug!(root = %root, dropped = pending.len(), "window closed with resolutions outstanding");
        }

        let items = acc.into_items();
        let completeness = Completeness::evaluate(expected, items.len());
        let elapsed = started.elapsed();
        debug!(
            root = %root,
            received = items.len(),
            elapsed = ?elapsed,
            settled = completeness.is_settled(),
            "bounded read closed"
        );

        Ok(CollectionRead {
            path: root.clone(),
            items,
            window,
            elapsed,
            completeness,
        })
    }

    /// Repeat single-window reads until at least `expected_min` items arrive
    /// or the policy's attempts run out. Returns the largest snapshot seen.
    pub async fn read_collection_until(
        &self,
        root: &GraphPointer,
        expected_min: usize,
        policy: &RetryPolicy,
    ) -> SyncResult<CollectionRead> {
        let mut best = self.read_collection(root, Some(expected_min)).await?;
        let mut attempt = 1;

        while !best.completeness.is_settled() && attempt < policy.max_attempts {
            policy.pause(attempt - 1).await;
            let read = self.read_collection(root, Some(expected_min)).await?;
            debug!(root = %root, attempt = attempt + 1, received = read.len(), "re-read collection");
            if read.len() >= best.len() {
                best = read;
            }
            attempt += 1;
        }

        Ok(best)
    }

    fn accept_child(
        &self,
        root: &GraphPointer,
        item_kind: Option<EntityKind>,
        update: ChildUpdate,
        acc: &mut Accumulator,
    ) -> Option<PendingResolution> {
        let ChildUpdate { key, value } = update;

        if value.is_null() {
            debug!(root = %root, child = %key, "child tombstoned");
            acc.tombstone(&key);
            return None;
        }

        let resolver = self.resolver.clone();
        match value {
            Value::Object(ref map) if !map.contains_key(POINTER_KEY) => {
                let Some(kind) = item_kind else {
                    warn!(root = %root, child = %key, "inline child in a collection of unknown kind");
                    return None;
                };
                let soul = match root.child(&key) {
                    Ok(soul) => soul,
                    Err(err) => {
                        warn!(root = %root, child = %key, error = %err, "skipping child with malformed key");
                        return None;
                    }
                };
                let generation = acc.arrive(&key);
                let raw = map.clone();
                Some(
                    async move {
                        let result = resolver.entity_from_raw(kind, &soul, raw).await;
                        (key, generation, result)
                    }
                    .boxed(),
                )
            }
            other => match GraphValue::classify(&other) {
                Ok(GraphValue::Pointer(target)) => {
                    let generation = acc.arrive(&key);
                    Some(
                        async move {
                            let result = resolver.resolve_entity(&target, Freshness::Refresh).await;
                            (key, generation, result)
                        }
                        .boxed(),
                    )
                }
                Ok(GraphValue::Inline(scalar)) => {
                    warn!(root = %root, child = %key, value = %scalar, "skipping scalar collection child");
                    None
                }
                Err(err) => {
                    warn!(root = %root, child = %key, error = %err, "skipping malformed collection child");
                    None
                }
            },
        }
    }
}
