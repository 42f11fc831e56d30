//! Process-local hint store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::SyncResult;
use crate::domain::ports::HintStore;

#[derive(Debug, Default)]
pub struct InMemoryHintStore {
    hints: RwLock<HashMap<String, String>>,
}

impl InMemoryHintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with `(game_id, actor_id)` pairs.
    pub fn with_hints<I, G, A>(hints: I) -> Self
    where
        I: IntoIterator<Item = (G, A)>,
        G: Into<String>,
        A: Into<String>,
    {
        let hints = hints
            .into_iter()
            .map(|(game, actor)| (game.into(), actor.into()))
            .collect();
        Self {
            hints: RwLock::new(hints),
        }
    }
}

#[async_trait]
impl HintStore for InMemoryHintStore {
    async fn get(&self, game_id: &str) -> SyncResult<Option<String>> {
        Ok(self.hints.read().await.get(game_id).cloned())
    }

    async fn set(&self, game_id: &str, actor_id: &str) -> SyncResult<()> {
        self.hints
            .write()
            .await
            .insert(game_id.to_string(), actor_id.to_string());
        Ok(())
    }

    async fn remove(&self, game_id: &str) -> SyncResult<()> {
        self.hints.write().await.remove(game_id);
        Ok(())
    }
}
