//! Dashboard configuration
//!
//! Read from TOML, every field optional:
//!
//! ```toml
//! [cache]
//! dir = "/var/cache/pitwall"
//!
//! [fetch]
//! timeout_secs = 30
//! coalesce_in_flight = false
//!
//! [warmup]
//! seasons = [2021, 2022, 2023, 2024]
//! first_round = 1
//! last_round = 10
//! max_parallel = 6
//! ```

use crate::models::{SessionKey, SessionKind};
use crate::provider::jolpica::JOLPICA_BASE_URL;
use crate::provider::ProviderConfig;
use crate::warmup::{season_matrix, WarmupConfig};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
    pub warmup: WarmupSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache directory (defaults to the platform cache dir)
    pub dir: Option<PathBuf>,

    /// Set to false to run without persistent cache
    pub enabled: bool,

    /// Hours before the calendar of a running season is refreshed
    pub schedule_ttl_hours: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            enabled: true,
            schedule_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub base_url: String,
    pub timeout_secs: u64,

    /// Serialize concurrent fetches of one session
    pub coalesce_in_flight: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: JOLPICA_BASE_URL.to_string(),
            timeout_secs: 30,
            coalesce_in_flight: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupSettings {
    pub enabled: bool,
    pub seasons: Vec<i32>,
    pub first_round: u32,
    pub last_round: u32,
    pub kind: SessionKind,
    pub max_parallel: usize,
    pub timeout_secs: u64,
    pub start_delay_secs: u64,
    pub abort_on_timeout: bool,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            seasons: (2021..=2024).collect(),
            first_round: 1,
            last_round: 10,
            kind: SessionKind::Race,
            max_parallel: 6,
            timeout_secs: 60,
            start_delay_secs: 3,
            abort_on_timeout: false,
        }
    }
}

impl DashboardConfig {
    /// Default config file location (`<config_dir>/pitwall/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pitwall").join("config.toml"))
    }

    /// Load from an explicit path, else the default location if present, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.warmup;
        if w.first_round == 0 || w.first_round > w.last_round {
            bail!(
                "warmup rounds must satisfy 1 <= first_round <= last_round (got {}..={})",
                w.first_round,
                w.last_round
            );
        }
        if w.timeout_secs == 0 {
            bail!("warmup.timeout_secs must be positive");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be positive");
        }
        Ok(())
    }

    /// Resolved cache directory
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache
            .dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("pitwall")))
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            schedule_ttl: Duration::from_secs(self.cache.schedule_ttl_hours * 3600),
            ..ProviderConfig::default()
        }
    }

    pub fn warmup_config(&self) -> WarmupConfig {
        WarmupConfig {
            max_parallel: self.warmup.max_parallel,
            per_task_timeout: Duration::from_secs(self.warmup.timeout_secs),
            start_delay: Duration::from_secs(self.warmup.start_delay_secs),
            abort_on_timeout: self.warmup.abort_on_timeout,
        }
    }

    /// Sessions pre-fetched on first use
    pub fn warmup_keys(&self) -> Vec<SessionKey> {
        season_matrix(
            self.warmup.seasons.iter().copied(),
            self.warmup.first_round..=self.warmup.last_round,
            self.warmup.kind,
        )
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }
}
