use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use services::EngineSettings;
use tracing::info;

pub const DEFAULT_DB_URL: &str = "sqlite://progress.sqlite3";

/// Contents of `progressd.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub collaborators: CollaboratorsConfig,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DB_URL.to_owned(),
        }
    }
}

/// Without a Redis URL the fast cache lives in process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    /// Base URL of the homework service; absent means log-only.
    pub homework_base_url: Option<String>,
    /// Redis instance carrying the event stream; absent means log-only.
    pub event_stream_redis_url: Option<String>,
}

impl Config {
    /// Read `path` if it exists, otherwise fall back to defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// # Errors
    ///
    /// Fails on malformed TOML, mistyped fields or invalid engine settings.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.engine.validate().context("invalid [engine] section")?;
        Ok(config)
    }

    /// Command-line and environment values win over the file.
    pub fn apply_overrides(&mut self, db_url: Option<String>, redis_url: Option<String>) {
        if let Some(url) = db_url {
            self.database.url = url;
        }
        if redis_url.is_some() {
            self.cache.redis_url = redis_url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.database.url, DEFAULT_DB_URL);
        assert_eq!(config.engine.sync_interval_secs, 30);
        assert!(config.cache.redis_url.is_none());
    }

    #[test]
    fn sections_are_read() {
        let config = Config::parse(
            r#"
            [database]
            url = "sqlite://data/edu.sqlite3"

            [cache]
            redis_url = "redis://127.0.0.1:6379"

            [collaborators]
            homework_base_url = "http://homework.local:8080"

            [engine]
            sync_interval_secs = 10
            cheat_grace_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url, "sqlite://data/edu.sqlite3");
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(
            config.collaborators.homework_base_url.as_deref(),
            Some("http://homework.local:8080")
        );
        assert!(config.collaborators.event_stream_redis_url.is_none());
        assert_eq!(config.engine.sync_interval_secs, 10);
        assert_eq!(config.engine.cheat_grace_secs, 3);
        assert_eq!(config.engine.cache_ttl_secs, 604_800);
    }

    #[test]
    fn mistyped_value_is_an_error() {
        assert!(Config::parse("[engine]\nsync_interval_secs = \"soon\"").is_err());
    }

    #[test]
    fn negative_cheat_settings_are_rejected() {
        assert!(Config::parse("[engine]\ncheat_speed_tolerance = -1.0").is_err());
        assert!(Config::parse("[engine]\ncheat_speed_tolerance = nan").is_err());
        assert!(Config::parse("[engine]\ncheat_grace_secs = -5").is_err());
        assert!(Config::parse("[engine]\ncheat_speed_tolerance = 2.0").is_ok());
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let mut config = Config::default();
        config.cache.redis_url = Some("redis://file".into());

        config.apply_overrides(Some("sqlite::memory:".into()), None);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://file"));

        config.apply_overrides(None, Some("redis://flag".into()));
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://flag"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = Config::load(Path::new("does/not/exist/progressd.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
