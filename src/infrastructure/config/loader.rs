use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid convergence window for {0}: must be greater than 0 ms")]
    InvalidWindow(String),

    #[error("Invalid max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    #[error("Invalid initial_backoff_ms: {0}. Must be greater than 0")]
    InvalidInitialBackoff(u64),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid cache max_capacity: {0}. Must be at least 1")]
    InvalidCacheCapacity(u64),

    #[error("Hint file path cannot be empty")]
    EmptyHintPath,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .polity/config.yaml (project config)
    /// 3. .polity/local.yaml (project local overrides, optional)
    /// 4. Environment variables (POLITY_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Same as [`load`](Self::load) with `.polity/` resolved under `root`.
    pub fn load_from_dir(root: &Path) -> Result<Config> {
        let project = root.join(".polity");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(project.join("config.yaml")))
            .merge(Yaml::file(project.join("local.yaml")))
            .merge(Env::prefixed("POLITY_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.reads.convergence_window_ms == 0 {
            return Err(ConfigError::InvalidWindow("default".to_string()));
        }
        if let Some((name, _)) = config
            .reads
            .collection_windows_ms
            .iter()
            .find(|(_, ms)| **ms == 0)
        {
            return Err(ConfigError::InvalidWindow(name.clone()));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }
        if config.retry.initial_backoff_ms == 0 {
            return Err(ConfigError::InvalidInitialBackoff(
                config.retry.initial_backoff_ms,
            ));
        }
        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.cache.max_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity(config.cache.max_capacity));
        }

        if config.hints.path.trim().is_empty() {
            return Err(ConfigError::EmptyHintPath);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::BackoffSchedule;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_project_file(root: &TempDir, name: &str, contents: &str) {
        let dir = root.path().join(".polity");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reads.convergence_window_ms, 500);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.cache.max_capacity, 10_000);
        assert_eq!(config.hints.path, ".polity/hints.json");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
reads:
  convergence_window_ms: 250
  collection_windows_ms:
    agreements: 900
retry:
  max_attempts: 4
  schedule: linear
identity:
  repair_settle_ms: 50
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.reads.convergence_window_ms, 250);
        assert_eq!(config.reads.collection_windows_ms.get("agreements"), Some(&900));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.schedule, BackoffSchedule::Linear);
        assert_eq!(config.retry.initial_backoff_ms, 250);
        assert_eq!(config.identity.repair_settle_ms, 50);
        assert!(config.identity.scan_collection_on_miss);
        assert_eq!(config.logging.format, "json");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_window() {
        let mut config = Config::default();
        config.reads.convergence_window_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWindow(name) if name == "default"
        ));

        let mut config = Config::default();
        config.reads.collection_windows_ms.insert("cards".to_string(), 0);
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWindow(name) if name == "cards"
        ));
    }

    #[test]
    fn test_validate_retry() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxAttempts(0)
        ));

        let mut config = Config::default();
        config.retry.initial_backoff_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidInitialBackoff(0)
        ));

        let mut config = Config::default();
        config.retry.initial_backoff_ms = 3000;
        config.retry.max_backoff_ms = 1000;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(3000, 1000)
        ));
    }

    #[test]
    fn test_validate_cache_hints_and_logging() {
        let mut config = Config::default();
        config.cache.max_capacity = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidCacheCapacity(0)
        ));

        let mut config = Config::default();
        config.hints.path = "  ".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyHintPath
        ));

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "loud"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogRotation(_)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  max_capacity: 64").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.cache.max_capacity, 64);
        assert_eq!(config.reads.convergence_window_ms, 500);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "retry:\n  max_attempts: 0").unwrap();
        file.flush().unwrap();

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_hierarchical_merging() {
        let root = TempDir::new().unwrap();
        write_project_file(
            &root,
            "config.yaml",
            "reads:\n  convergence_window_ms: 300\nlogging:\n  level: info\n  format: json\n",
        );
        write_project_file(&root, "local.yaml", "logging:\n  level: debug\n");

        let config = temp_env::with_vars_unset(
            ["POLITY_LOGGING__LEVEL", "POLITY_READS__CONVERGENCE_WINDOW_MS"],
            || ConfigLoader::load_from_dir(root.path()).unwrap(),
        );

        assert_eq!(config.reads.convergence_window_ms, 300);
        assert_eq!(config.logging.level, "debug", "Local overrides should win");
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }

    #[test]
    fn test_env_override() {
        let root = TempDir::new().unwrap();
        write_project_file(&root, "config.yaml", "logging:\n  level: info\n");

        let config = temp_env::with_vars(
            [
                ("POLITY_LOGGING__LEVEL", Some("warn")),
                ("POLITY_RETRY__MAX_ATTEMPTS", Some("5")),
                ("POLITY_READS__COLLECTION_WINDOWS_MS__CARDS", Some("40")),
            ],
            || ConfigLoader::load_from_dir(root.path()).unwrap(),
        );

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.reads.collection_windows_ms.get("cards"), Some(&40));
    }
}
