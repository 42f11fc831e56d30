//! Live subscriptions on mutable nodes.
//!
//! Every subscription owns its own store watch and delivery task, so two
//! subscriptions on the same node are cancelled independently. Cancelling
//! clears the subscription's active flag (checked right before each
//! callback), aborts the delivery task and releases the store watch.
//! Dropping a [`Subscription`] handle cancels it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::errors::SyncResult;
use crate::domain::models::{entity_kind_of, Entity, GraphPointer};
use crate::domain::ports::{GraphStore, WatchId};
use crate::services::reference_resolver::ReferenceResolver;

struct Registered {
    path: GraphPointer,
    watch: WatchId,
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Registry of live subscriptions, shared with every [`Subscription`] handle.
struct Registry {
    store: Arc<dyn GraphStore>,
    entries: Mutex<HashMap<u64, Registered>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Registered>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, id: u64) -> bool {
        let Some(entry) = self.lock().remove(&id) else {
            return false;
        };
        Self::teardown(self.store.as_ref(), entry);
        debug!(subscription = id, "subscription cancelled");
        true
    }

    fn teardown(store: &dyn GraphStore, entry: Registered) {
        entry.active.store(false, Ordering::SeqCst);
        entry.task.abort();
        store.unwatch(entry.watch);
        debug!(path = %entry.path, watch = %entry.watch, "watch released");
    }
}

#[derive(Clone)]
pub struct SubscriptionManager {
    resolver: ReferenceResolver,
    registry: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionManager {
    pub fn new(resolver: ReferenceResolver) -> Self {
        let registry = Registry {
            store: Arc::clone(resolver.store()),
            entries: Mutex::new(HashMap::new()),
        };
        Self {
            resolver,
            registry: Arc::new(registry),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Watch the entity at `pointer` and call `on_change` with every new
    /// version, or `None` once it is deleted.
    ///
    /// Updated entities are written to the entity cache before delivery.
    /// Versions that arrive faster than they are delivered may be coalesced.
    pub async fn subscribe<F>(&self, pointer: &GraphPointer, on_change: F) -> SyncResult<Subscription>
    where
        F: Fn(Option<Entity>) + Send + Sync + 'static,
    {
        let kind = entity_kind_of(pointer)?;
        let mut watch = self.resolver.store().watch(pointer).await?;
        let watch_id = watch.id;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));

        let resolver = self.resolver.clone();
        let path = pointer.clone();
        let flag = Arc::clone(&active);
        let task = tokio::spawn(async move {
            while let Some(mut update) = watch.events.recv().await {
                while let Ok(newer) = watch.events.try_recv() {
                    update = newer;
                }

                let entity = match update.node {
                    None => {
                        resolver.cache().invalidate(&path).await;
                        None
                    }
                    Some(raw) => match resolver.entity_from_raw(kind, &path, raw).await {
                        Ok(entity) => entity,
                        Err(err) if err.is_fatal() => {
                            warn!(path = %path, error = %err, "subscription stopped");
                            break;
                        }
                        Err(err) => {
                            warn!(path = %path, error = %err, "skipping undecodable version");
                            continue;
                        }
                    },
                };

                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                on_change(entity);
            }
        });

        self.registry.lock().insert(
            id,
            Registered {
                path: pointer.clone(),
                watch: watch_id,
                active: Arc::clone(&active),
                task,
            },
        );

        debug!(subscription = id, path = %pointer, "subscribed");
        Ok(Subscription {
            id,
            path: pointer.clone(),
            active,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Number of live subscriptions.
    pub fn active_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Cancel every live subscription.
    pub fn cancel_all(&self) {
        let entries: Vec<Registered> = self.registry.lock().drain().map(|(_, e)| e).collect();
        let count = entries.len();
        for entry in entries {
            Registry::teardown(self.registry.store.as_ref(), entry);
        }
        debug!(count, "all subscriptions cancelled");
    }

    /// Empty scope on this manager.
    pub fn scope(&self) -> SubscriptionScope {
        SubscriptionScope::default()
    }
}

/// Handle to one live subscription; dropping it cancels the subscription.
#[must_use = "dropping a subscription cancels it"]
pub struct Subscription {
    id: u64,
    path: GraphPointer,
    active: Arc<AtomicBool>,
    registry: Arc<Registry>,
}

impl Subscription {
    pub fn path(&self) -> &GraphPointer {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop deliveries and release the watch. Safe to call more than once.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.registry.release(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Subscriptions belonging to one view; all are cancelled when the scope is
/// closed or dropped.
#[derive(Debug, Default)]
pub struct SubscriptionScope {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionScope {
    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn close(mut self) {
        self.cancel_all();
    }

    fn cancel_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
