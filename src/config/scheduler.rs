//! Scheduler configuration structures.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::identifier::DEFAULT_NAMESPACE;
use crate::core::{AppResult, ChainSettings, GlobalLimitConfig};

/// Trigger store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerBackendConfig {
    /// In-process store for development/testing.
    #[default]
    InMemory,
    /// Platform scheduler supplied by the embedding application.
    Native,
}

/// Index persistence selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexBackendConfig {
    /// Lost on restart.
    #[default]
    InMemory,
    /// JSON file at `path`.
    File {
        /// Location of the index file.
        path: PathBuf,
    },
}

/// Raw chain settings as written by the operator. Clamped when converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettingsConfig {
    /// Upper bound on triggers per chain.
    pub max_chain_count: i64,
    /// Seconds a chain should cover.
    pub ring_window_sec: i64,
    /// Spacing when the sound length is unknown.
    pub fallback_spacing_sec: i64,
    /// Minimum delay before the first trigger.
    pub min_lead_time_sec: i64,
    /// Grace period before a fired chain counts as stale.
    pub cleanup_grace_sec: i64,
}

impl Default for ChainSettingsConfig {
    fn default() -> Self {
        Self {
            max_chain_count: 12,
            ring_window_sec: 300,
            fallback_spacing_sec: 10,
            min_lead_time_sec: 10,
            cleanup_grace_sec: 60,
        }
    }
}

impl ChainSettingsConfig {
    /// Clamped settings.
    pub fn to_settings(&self) -> ChainSettings {
        ChainSettings::new(
            self.max_chain_count,
            self.ring_window_sec,
            self.fallback_spacing_sec,
            self.min_lead_time_sec,
            self.cleanup_grace_sec,
        )
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Chain sizing.
    pub chain: ChainSettingsConfig,
    /// Store quota.
    pub limits: GlobalLimitConfig,
    /// Index persistence.
    pub index: IndexBackendConfig,
    /// Trigger store backend.
    pub trigger_backend: TriggerBackendConfig,
    /// Identifier namespace prefix.
    pub namespace: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            chain: ChainSettingsConfig::default(),
            limits: GlobalLimitConfig::default(),
            index: IndexBackendConfig::default(),
            trigger_backend: TriggerBackendConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// Chain settings are clamped rather than rejected; their advisory
    /// warnings are logged only.
    pub fn validate(&self) -> Result<(), String> {
        self.limits
            .validate()
            .map_err(|e| format!("limits invalid: {e}"))?;
        if self.namespace.is_empty() {
            return Err("namespace must not be empty".into());
        }
        if self.namespace.contains("-occ-") {
            return Err("namespace must not contain `-occ-`".into());
        }
        if let IndexBackendConfig::File { path } = &self.index {
            if path.as_os_str().is_empty() {
                return Err("index file path must not be empty".into());
            }
        }
        for warning in self.chain.to_settings().validate() {
            tracing::warn!("chain settings: {}", warning);
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the environment, reading `.env` first when present.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are
    /// errors.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();

        if let Some(v) = env_i64("CHAIN_MAX_COUNT")? {
            cfg.chain.max_chain_count = v;
        }
        if let Some(v) = env_i64("CHAIN_RING_WINDOW_SEC")? {
            cfg.chain.ring_window_sec = v;
        }
        if let Some(v) = env_i64("CHAIN_FALLBACK_SPACING_SEC")? {
            cfg.chain.fallback_spacing_sec = v;
        }
        if let Some(v) = env_i64("CHAIN_MIN_LEAD_TIME_SEC")? {
            cfg.chain.min_lead_time_sec = v;
        }
        if let Some(v) = env_i64("CHAIN_CLEANUP_GRACE_SEC")? {
            cfg.chain.cleanup_grace_sec = v;
        }
        if let Some(v) = env_opt("TRIGGER_MAX_SYSTEM_LIMIT") {
            cfg.limits.max_system_limit = v
                .parse()
                .with_context(|| format!("TRIGGER_MAX_SYSTEM_LIMIT=`{v}`"))?;
        }
        if let Some(v) = env_opt("TRIGGER_SAFETY_BUFFER") {
            cfg.limits.safety_buffer = v
                .parse()
                .with_context(|| format!("TRIGGER_SAFETY_BUFFER=`{v}`"))?;
        }
        if let Some(path) = env_opt("CHAIN_INDEX_PATH") {
            cfg.index = IndexBackendConfig::File { path: path.into() };
        }
        if let Some(ns) = env_opt("CHAIN_NAMESPACE") {
            cfg.namespace = ns;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_i64(key: &str) -> AppResult<Option<i64>> {
    env_opt(key)
        .map(|v| v.parse().with_context(|| format!("{key}=`{v}`")))
        .transpose()
}
