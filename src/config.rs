// src/config.rs
//! Runtime configuration: defaults → TOML file → environment → CLI flags.

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::report::description::DEFAULT_BREAK_MARKER;
use crate::report::{DescriptionParser, FeatureNormalizer};

pub const ENV_CONFIG_PATH: &str = "SYNC_CONFIG_PATH";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_INTERVAL_SECS: &str = "SYNC_INTERVAL_SECS";
pub const DEFAULT_CONFIG_PATH: &str = "config/sync.toml";

/// `database_url` value selecting the in-memory store.
pub const MEMORY_STORE: &str = "memory";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub database_url: String,
    /// Repeat interval; `None` runs a single pass.
    pub interval_secs: Option<u64>,
    pub transform_workers: usize,
    pub queue_capacity: usize,
    pub break_marker: String,
    /// IANA zone of the free-text `UPDATED:` attribute.
    pub updated_timezone: String,
    pub http_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://incidents.db?mode=rwc".to_string(),
            interval_secs: None,
            transform_workers: 4,
            queue_capacity: 64,
            break_marker: DEFAULT_BREAK_MARKER.to_string(),
            updated_timezone: "Australia/Sydney".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).context("parsing sync config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sync config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// 1) explicit path, 2) $SYNC_CONFIG_PATH, 3) config/sync.toml, 4) defaults;
    /// then environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = if let Some(p) = explicit {
            Self::load_from(p)?
        } else if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            if !url.trim().is_empty() {
                self.database_url = url;
            }
        }
        if let Ok(v) = std::env::var(ENV_INTERVAL_SECS) {
            let secs: u64 = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INTERVAL_SECS}={v:?} is not a number"))?;
            self.interval_secs = Some(secs);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.transform_workers == 0 {
            bail!("transform_workers must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if self.interval_secs == Some(0) {
            bail!("interval_secs must be positive when set");
        }
        if self.database_url.trim().is_empty() {
            bail!("database_url is empty");
        }
        self.updated_tz()?;
        Ok(())
    }

    pub fn updated_tz(&self) -> Result<Tz> {
        self.updated_timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown timezone {:?}: {e}", self.updated_timezone))
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_STORE
    }

    pub fn normalizer(&self) -> Result<FeatureNormalizer> {
        Ok(FeatureNormalizer::new(
            DescriptionParser::new(self.break_marker.clone()),
            self.updated_tz()?,
        ))
    }
}
