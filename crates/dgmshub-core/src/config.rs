//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API location, sync cadence, staleness thresholds and which catalog
//! backend to read from.
//!
//! Configuration is stored at `~/.config/dgmshub/config.json`. Every field
//! is optional in the file; `DGMSHUB_*` environment variables override it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "dgmshub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Production backend
const DEFAULT_API_BASE_URL: &str = "https://dgms-hub-backend.onrender.com/api";

/// Where the sync engine reads the catalog from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// The REST API at `api_base_url`
    #[default]
    Remote,
    /// The built-in school catalog
    Static,
    /// An in-memory catalog seeded with the built-in entries
    Memory,
    /// A SQLite database file
    Sqlite { path: PathBuf },
}

impl std::fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Remote => write!(f, "remote"),
            BackendConfig::Static => write!(f, "static"),
            BackendConfig::Memory => write!(f, "memory"),
            BackendConfig::Sqlite { path } => write!(f, "sqlite:{}", path.display()),
        }
    }
}

impl BackendConfig {
    /// Parse `remote`, `static`, `memory` or `sqlite:<path>`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "remote" => Some(BackendConfig::Remote),
            "static" => Some(BackendConfig::Static),
            "memory" => Some(BackendConfig::Memory),
            _ => value
                .strip_prefix("sqlite:")
                .filter(|p| !p.is_empty())
                .map(|p| BackendConfig::Sqlite { path: PathBuf::from(p) }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub sync_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub stale_after_minutes: i64,
    pub resync_after_minutes: i64,
    pub reachability_interval_secs: u64,
    pub cache_dir: Option<PathBuf>,
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            sync_interval_secs: 5 * 60,
            request_timeout_secs: 10,
            stale_after_minutes: 60,
            resync_after_minutes: 10,
            reachability_interval_secs: 15,
            cache_dir: None,
            backend: BackendConfig::Remote,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `DGMSHUB_API_URL`, `DGMSHUB_BACKEND` and `DGMSHUB_CACHE_DIR`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DGMSHUB_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(backend) = lookup("DGMSHUB_BACKEND").and_then(|v| BackendConfig::parse(&v)) {
            self.backend = backend;
        }
        if let Some(dir) = lookup("DGMSHUB_CACHE_DIR").filter(|v| !v.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"sync_interval_secs": 60}"#).unwrap();
        assert_eq!(config.sync_interval_secs, 60);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.backend, BackendConfig::Remote);
    }

    #[test]
    fn test_backend_serde() {
        let config: Config =
            serde_json::from_str(r#"{"backend": {"kind": "sqlite", "path": "/tmp/catalog.db"}}"#)
                .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Sqlite { path: PathBuf::from("/tmp/catalog.db") }
        );
    }

    #[test]
    fn test_backend_display_parses_back() {
        for backend in [
            BackendConfig::Remote,
            BackendConfig::Static,
            BackendConfig::Memory,
            BackendConfig::Sqlite { path: PathBuf::from("/var/lib/dgmshub/catalog.db") },
        ] {
            assert_eq!(BackendConfig::parse(&backend.to_string()), Some(backend));
        }
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(BackendConfig::parse("Static"), Some(BackendConfig::Static));
        assert_eq!(BackendConfig::parse(" memory "), Some(BackendConfig::Memory));
        assert_eq!(
            BackendConfig::parse("sqlite:hub.db"),
            Some(BackendConfig::Sqlite { path: PathBuf::from("hub.db") })
        );
        assert_eq!(BackendConfig::parse("sqlite:"), None);
        assert_eq!(BackendConfig::parse("postgres"), None);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DGMSHUB_API_URL", "http://localhost:3000/api"),
            ("DGMSHUB_BACKEND", "static"),
            ("DGMSHUB_CACHE_DIR", "/tmp/dgmshub"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_base_url, "http://localhost:3000/api");
        assert_eq!(config.backend, BackendConfig::Static);
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/dgmshub"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = Config {
            stale_after_minutes: 30,
            backend: BackendConfig::Memory,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }
}
