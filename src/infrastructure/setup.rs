//! Wiring of the consistency layer for the CLI.
//!
//! Builds the in-memory peer (optionally from a seed snapshot), the moka
//! entity cache, the file hint store and the [`GameContextService`] over
//! them, all from one [`Config`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::adapters::cache::MokaEntityCache;
use crate::adapters::hints::FileHintStore;
use crate::adapters::memory::{InMemoryGraphStore, MemoryStoreOptions, Seed};
use crate::domain::models::Config;
use crate::services::GameContextService;

/// A wired service plus the peer it reads from.
pub struct Runtime {
    pub config: Config,
    pub store: Arc<InMemoryGraphStore>,
    pub service: GameContextService,
    seed_path: Option<PathBuf>,
}

impl Runtime {
    pub async fn build(config: Config) -> Result<Self> {
        let options = MemoryStoreOptions {
            child_delivery_delay: Duration::from_millis(config.store.child_delivery_delay_ms),
        };
        let seed_path = config.store.seed_path.as_ref().map(PathBuf::from);

        let seed = match &seed_path {
            Some(path) if path.exists() => Seed::load(path)
                .await
                .with_context(|| format!("Failed to load seed from {}", path.display()))?,
            Some(path) => {
                debug!(path = %path.display(), "seed file does not exist yet, starting empty");
                Seed::default()
            }
            None => Seed::default(),
        };
        let nodes = seed.nodes.len();
        let store = Arc::new(InMemoryGraphStore::from_seed(seed, options));

        let cache = Arc::new(MokaEntityCache::with_capacity(config.cache.max_capacity));
        let hints = Arc::new(FileHintStore::new(&config.hints.path));
        let service = GameContextService::new(store.clone(), cache, hints, &config);

        info!(nodes, seed = ?seed_path, "runtime ready");
        Ok(Self {
            config,
            store,
            service,
            seed_path,
        })
    }

    /// Write the peer's current state back to the seed file, if one is set.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.seed_path else {
            debug!("no seed path configured, nothing to persist");
            return Ok(());
        };
        self.store
            .snapshot()
            .save(path)
            .await
            .with_context(|| format!("Failed to save seed to {}", path.display()))?;
        debug!(path = %path.display(), "seed persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GraphPointer;
    use crate::domain::ports::GraphStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_build_loads_and_persists_seed() {
        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("seed.yaml");
        std::fs::write(&seed_path, "nodes:\n  games/g1:\n    name: Council\n").unwrap();

        let mut config = Config::default();
        config.store.seed_path = Some(seed_path.display().to_string());
        config.hints.path = dir.path().join("hints.json").display().to_string();

        let runtime = Runtime::build(config).await.unwrap();
        let path = GraphPointer::parse("games/g1").unwrap();
        assert!(runtime.store.get_once(&path).await.unwrap().is_some());

        runtime
            .store
            .write(&path, json!({"status": "open"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        runtime.persist().await.unwrap();

        let saved = Seed::load(&seed_path).await.unwrap();
        assert_eq!(saved.nodes[&path]["status"], "open");
    }
}
