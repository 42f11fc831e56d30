//! Seed snapshots for the in-memory peer.
//!
//! A seed maps node paths to raw field maps:
//!
//! ```yaml
//! nodes:
//!   games/g1:
//!     name: Harbour Council
//!     actors: {"#": games/g1/actors}
//!   games/g1/actors:
//!     a1: {"#": actors/a1}
//! ```
//!
//! YAML and JSON are both accepted; files ending in `.json` are written back
//! as JSON, anything else as YAML.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::errors::SyncResult;
use crate::domain::models::{GraphPointer, RawNode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub nodes: BTreeMap<GraphPointer, RawNode>,
}

impl Seed {
    pub fn parse(contents: &str) -> SyncResult<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&contents)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let path = path.as_ref();
        let contents = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_with_pointers() {
        let seed = Seed::parse(
            r##"
nodes:
  games/g1:
    name: Harbour Council
    actors: {"#": games/g1/actors}
  games/g1/actors:
    a1: {"#": actors/a1}
"##,
        )
        .unwrap();
        assert_eq!(seed.nodes.len(), 2);
        let game = &seed.nodes[&GraphPointer::parse("games/g1").unwrap()];
        assert_eq!(game["actors"]["#"], "games/g1/actors");
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!(Seed::parse("nodes:\n  'games//g1':\n    name: x\n").is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        let seed = Seed::parse("nodes:\n  users/u1:\n    alias: ana\n").unwrap();

        seed.save(&path).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.trim_start().starts_with('{'));
        assert_eq!(Seed::load(&path).await.unwrap(), seed);
    }
}
