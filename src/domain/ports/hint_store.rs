use async_trait::async_trait;

use crate::domain::errors::SyncResult;

/// Client-local hint: last actor id this session used in a game.
///
/// Advisory only; callers validate a hint before trusting it and remove it
/// when validation fails.
#[async_trait]
pub trait HintStore: Send + Sync {
    async fn get(&self, game_id: &str) -> SyncResult<Option<String>>;

    async fn set(&self, game_id: &str, actor_id: &str) -> SyncResult<()>;

    async fn remove(&self, game_id: &str) -> SyncResult<()>;
}
