//! Configuration management
//!
//! Settings live in `<data_dir>/settings.json`:
//! ```json
//! {
//!   "import": { "chunkSize": 1000, "maxUploadBytes": 20971520, "defaultCurrency": "IDR" },
//!   "commit": { "chunkSize": 500 },
//!   "cache":  { "ttlSeconds": 3600 },
//!   "poll":   { "intervalMs": 500, "timeoutSeconds": 600 }
//! }
//! ```
//! Every key is optional. Keys this crate does not know about are kept
//! when the file is saved.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::result::Error;
use crate::domain::{Role, DEFAULT_CURRENCY};
use crate::services::commit::DEFAULT_COMMIT_CHUNK_SIZE;
use crate::services::importer::DEFAULT_CHUNK_SIZE;
use crate::services::orchestrator::DEFAULT_MAX_UPLOAD_BYTES;
use crate::services::worker::WorkerSettings;

const SETTINGS_FILE: &str = "settings.json";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    import: ImportSettings,
    #[serde(default)]
    commit: CommitSettings,
    #[serde(default)]
    cache: CacheSettings,
    #[serde(default)]
    poll: PollSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_upload_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_currency: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_size: Option<usize>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl_seconds: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub import_chunk_size: usize,
    pub max_upload_bytes: u64,
    pub default_currency: String,
    pub commit_chunk_size: usize,
    pub cache_ttl: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Role of whoever runs the CLI
    pub role: Role,
    raw: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(SettingsFile::default())
    }
}

impl Config {
    fn from_raw(raw: SettingsFile) -> Self {
        Self {
            import_chunk_size: raw.import.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
            max_upload_bytes: raw.import.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            default_currency: raw
                .import
                .default_currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            commit_chunk_size: raw.commit.chunk_size.unwrap_or(DEFAULT_COMMIT_CHUNK_SIZE).max(1),
            cache_ttl: Duration::from_secs(raw.cache.ttl_seconds.unwrap_or(3600)),
            poll_interval: Duration::from_millis(raw.poll.interval_ms.unwrap_or(500)),
            poll_timeout: Duration::from_secs(raw.poll.timeout_seconds.unwrap_or(600)),
            role: Role::Admin,
            raw,
        }
    }

    /// Load settings.json from `data_dir`, then apply environment overrides
    ///
    /// A missing file means defaults; a malformed one is an error.
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with_env(data_dir, |key| std::env::var(key).ok())
    }

    /// `load` with an injectable environment lookup
    pub fn load_with_env(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let mut config = Self::from_raw(raw);

        if let Some(value) = env("BANKREPORT_CHUNK_SIZE") {
            config.import_chunk_size = parse_positive("BANKREPORT_CHUNK_SIZE", &value)? as usize;
        }
        if let Some(value) = env("BANKREPORT_CACHE_TTL") {
            config.cache_ttl = Duration::from_secs(parse_positive("BANKREPORT_CACHE_TTL", &value)?);
        }
        if let Some(value) = env("BANKREPORT_ROLE") {
            config.role = Role::parse(&value).ok_or_else(|| {
                Error::Config(format!("BANKREPORT_ROLE must be admin or viewer, got {:?}", value))
            })?;
        }

        Ok(config)
    }

    /// Save to settings.json, keeping keys this crate does not manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_else(|_| self.raw.clone())
        } else {
            self.raw.clone()
        };

        settings.import.chunk_size = Some(self.import_chunk_size);
        settings.import.max_upload_bytes = Some(self.max_upload_bytes);
        settings.import.default_currency = Some(self.default_currency.clone());
        settings.commit.chunk_size = Some(self.commit_chunk_size);
        settings.cache.ttl_seconds = Some(self.cache_ttl.as_secs());
        settings.poll.interval_ms = Some(self.poll_interval.as_millis() as u64);
        settings.poll.timeout_seconds = Some(self.poll_timeout.as_secs());

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Tunables handed to background jobs
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            import_chunk_size: self.import_chunk_size,
            commit_chunk_size: self.commit_chunk_size,
            default_currency: self.default_currency.clone(),
        }
    }
}

fn parse_positive(name: &str, value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!("{} must be a positive integer, got {:?}", name, value)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_with_env(dir.path(), no_env).unwrap();

        assert_eq!(config.import_chunk_size, 1000);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.default_currency, "IDR");
        assert_eq!(config.commit_chunk_size, 500);
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.role, Role::Admin);
    }

    #[test]
    fn test_settings_file_and_env_overrides() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"import": {"chunkSize": 250, "defaultCurrency": "USD"}, "cache": {"ttlSeconds": 60}}"#,
        )
        .unwrap();

        let config = Config::load_with_env(dir.path(), |key| match key {
            "BANKREPORT_CHUNK_SIZE" => Some("50".to_string()),
            "BANKREPORT_ROLE" => Some("viewer".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.import_chunk_size, 50);
        assert_eq!(config.default_currency, "USD");
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.role, Role::Viewer);
    }

    #[test]
    fn test_invalid_overrides_are_errors() {
        let dir = TempDir::new().unwrap();
        let bad_size = Config::load_with_env(dir.path(), |key| {
            (key == "BANKREPORT_CHUNK_SIZE").then(|| "0".to_string())
        });
        assert!(bad_size.is_err());

        let bad_role = Config::load_with_env(dir.path(), |key| {
            (key == "BANKREPORT_ROLE").then(|| "root".to_string())
        });
        assert!(bad_role.is_err());
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"theme": "dark", "import": {"sheetName": "Data"}}"#).unwrap();

        let mut config = Config::load_with_env(dir.path(), no_env).unwrap();
        config.commit_chunk_size = 100;
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["import"]["sheetName"], "Data");
        assert_eq!(saved["commit"]["chunkSize"], 100);
    }
}
