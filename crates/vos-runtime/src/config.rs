//! # Runtime Configuration
//!
//! `vos.yaml` names every other input the runtime loads at startup. All
//! sections are optional; an empty file runs the standard schema and rules
//! with log targets and the default timer schedules.
//!
//! ```yaml
//! schema: schema.yaml           # default: built-in standard schema
//! products: products.yaml
//! rules: [rules/]               # files or directories; default: standard rules
//! fact_log: data/facts.jsonl    # default: in-memory only
//! retry: { max_attempts: 3, base_delay_ms: 200, max_delay_ms: 5000 }
//! bus: { channel_capacity: 256, max_redeliveries: 3, redelivery_backoff_ms: 100 }
//! engine: { dedup_capacity: 10000, audit_capacity: 10000 }
//! timers: { enabled: true, tick_ms: 1000 }
//! webhooks:
//!   deployment: { url: https://deploy.internal/hooks/vos, token_env: DEPLOY_TOKEN }
//! api: { bind: 127.0.0.1:8080 }
//! ```
//!
//! Relative paths resolve against the directory holding `vos.yaml`.
//! `VOS_FACT_LOG`, `VOS_API_BIND` and `VOS_AUTH_TOKEN` override the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vos_bus::{BusConfig, TimerJob, TimerSource};
use vos_core::TargetSystem;
use vos_dispatch::{RetryPolicy, WebhookConfig};
use vos_rules::engine::{DEFAULT_AUDIT_CAPACITY, DEFAULT_DEDUP_CAPACITY};

pub const ENV_FACT_LOG: &str = "VOS_FACT_LOG";
pub const ENV_API_BIND: &str = "VOS_API_BIND";
pub const ENV_AUTH_TOKEN: &str = "VOS_AUTH_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub(crate) fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Triggers remembered for redelivery deduplication. 0 disables it.
    pub dedup_capacity: usize,
    pub audit_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimerConfig {
    pub enabled: bool,
    /// Polling interval for due jobs.
    pub tick_ms: u64,
    /// Replaces the default schedules when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<TimerJob>>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 1_000,
            jobs: None,
        }
    }
}

impl TimerConfig {
    pub fn source(&self) -> TimerSource {
        match &self.jobs {
            Some(jobs) => TimerSource::new(jobs.clone()),
            None => TimerSource::default_schedules(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub bind: String,
    /// Bearer token required on `/v1/*`. Only read from `VOS_AUTH_TOKEN`.
    #[serde(skip)]
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            auth_token: None,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind", &self.bind)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<PathBuf>,
    /// Rule files or directories. Empty means the standard rules.
    pub rules: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_log: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub bus: BusConfig,
    pub engine: EngineConfig,
    pub timers: TimerConfig,
    /// Webhook target per system; systems without one use a log target.
    pub webhooks: BTreeMap<TargetSystem, WebhookConfig>,
    pub api: ApiConfig,
}

impl RuntimeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Load from a file, resolving relative paths against its directory.
    /// Environment overrides are not applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_file(path)?;
        let mut config = Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        tracing::debug!(path = %path.display(), "runtime configuration loaded");
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.schema.iter_mut().for_each(resolve);
        self.products.iter_mut().for_each(resolve);
        self.fact_log.iter_mut().for_each(resolve);
        self.rules.iter_mut().for_each(resolve);
    }

    /// Apply `VOS_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = get(ENV_FACT_LOG) {
            self.fact_log = Some(PathBuf::from(path));
        }
        if let Some(bind) = get(ENV_API_BIND) {
            self.api.bind = bind;
        }
        if let Some(token) = get(ENV_AUTH_TOKEN) {
            self.api.auth_token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vos_bus::Cadence;

    #[test]
    fn empty_config_is_default() {
        let config = RuntimeConfig::from_yaml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.timers.enabled);
        assert_eq!(config.engine.dedup_capacity, DEFAULT_DEDUP_CAPACITY);
        assert_eq!(config.timers.source().jobs().len(), 5);
    }

    #[test]
    fn parses_full_config() {
        let yaml = r#"
schema: schema.yaml
products: products.yaml
rules: [rules/, extra.yaml]
retry: { max_attempts: 5 }
bus: { channel_capacity: 16 }
engine: { dedup_capacity: 0 }
timers:
  tick_ms: 250
  jobs:
    - job_id: hourly_ads
      event_type: schedule.ads_optimization
      cadence: every
      minutes: 60
webhooks:
  deployment: { url: "https://deploy.example.com/hook", token_env: DEPLOY_TOKEN }
api: { bind: "0.0.0.0:9000" }
"#;
        let config = RuntimeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.bus.channel_capacity, 16);
        assert_eq!(config.engine.dedup_capacity, 0);
        let jobs = config.timers.jobs.as_ref().unwrap();
        assert_eq!(jobs[0].cadence, Cadence::Every { minutes: 60 });
        assert_eq!(
            config.webhooks[&TargetSystem::Deployment].token_env.as_deref(),
            Some("DEPLOY_TOKEN")
        );
        assert_eq!(config.api.bind, "0.0.0.0:9000");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(RuntimeConfig::from_yaml_str("rulez: []").is_err());
        assert!(RuntimeConfig::from_yaml_str("webhooks: { fax: { url: x } }").is_err());
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vos.yaml");
        std::fs::write(&path, "schema: schema.yaml\nrules: [/etc/vos/rules]\n").unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.schema, Some(dir.path().join("schema.yaml")));
        assert_eq!(config.rules, vec![PathBuf::from("/etc/vos/rules")]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RuntimeConfig::load(&dir.path().join("absent.yaml")),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn overrides_apply_and_token_is_redacted() {
        let env: HashMap<&str, &str> = [
            (ENV_FACT_LOG, "/var/lib/vos/facts.jsonl"),
            (ENV_API_BIND, ""),
            (ENV_AUTH_TOKEN, "hunter2"),
        ]
        .into_iter()
        .collect();
        let mut config = RuntimeConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.fact_log, Some(PathBuf::from("/var/lib/vos/facts.jsonl")));
        assert_eq!(config.api.bind, "127.0.0.1:8080");
        assert_eq!(config.api.auth_token.as_deref(), Some("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
