use crate::quota::reconciler::DEFAULT_RECONCILE_INTERVAL_SECS;
use crate::remote::http::DEFAULT_TIMEOUT;
use crate::sync_paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Free actions an anonymous actor gets. Default: 6
    #[serde(default = "default_max_count")]
    pub max_count: u32,
    /// Minimum seconds between unforced reconciles. Default: 5
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: i64,
    /// Origin the counter store is scoped to.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// `GET` endpoint answering `{ unlimited, remaining }`.
    #[serde(default = "default_quota_endpoint")]
    pub quota_endpoint: String,
    /// Favorites collection endpoint.
    #[serde(default = "default_collection_endpoint")]
    pub collection_endpoint: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Write the JSONL event journal. Default: false
    #[serde(default)]
    pub journal: bool,
}

fn default_max_count() -> u32 {
    6
}

fn default_reconcile_interval_secs() -> i64 {
    DEFAULT_RECONCILE_INTERVAL_SECS
}

fn default_origin() -> String {
    "http://localhost:8000".to_string()
}

fn default_quota_endpoint() -> String {
    "http://localhost:8000/api/remaining-quota".to_string()
}

fn default_collection_endpoint() -> String {
    "http://localhost:8000/api/favorites".to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            origin: default_origin(),
            quota_endpoint: default_quota_endpoint(),
            collection_endpoint: default_collection_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            journal: false,
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, else `~/.quota-sync/config.yaml` when it
    /// exists, else the embedded defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let user_config = sync_paths::config_path()?;
        if user_config.exists() {
            return Self::load(&user_config);
        }
        Ok(Self::default_config())
    }

    pub fn default_config() -> Self {
        const DEFAULT_CONFIG_YAML: &str = include_str!("../quota-sync.yaml");

        serde_yaml::from_str(DEFAULT_CONFIG_YAML).unwrap_or_else(|e| {
            tracing::warn!("Embedded quota-sync.yaml is invalid, using built-in defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_count == 0 {
            anyhow::bail!("max_count must be at least 1");
        }
        if self.reconcile_interval_secs < 0 {
            anyhow::bail!(
                "reconcile_interval_secs must not be negative (got {})",
                self.reconcile_interval_secs
            );
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        if self.origin.trim().is_empty() {
            anyhow::bail!("origin must not be empty");
        }
        for (name, endpoint) in [
            ("quota_endpoint", &self.quota_endpoint),
            ("collection_endpoint", &self.collection_endpoint),
        ] {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", name, endpoint);
            }
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reconcile_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
