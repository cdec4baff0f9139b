// ⚙️ Configuration - TOML file with defaults for every section
//
// Unknown keys are a configuration error.

use crate::retry::{RetryPolicy, MAX_ATTEMPTS};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENTERPRISE_URL: &str = "https://thongtindoanhnghiep.co";
pub const DEFAULT_INSURANCE_URL: &str = "http://vssapp.teca.vn:8088";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrationConfig {
    pub enterprise: SourceConfig,
    pub insurance: SourceConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub persistence: PersistenceConfig,
    pub batch: BatchConfig,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        IntegrationConfig {
            enterprise: SourceConfig::with_url(DEFAULT_ENTERPRISE_URL),
            insurance: SourceConfig::with_url(DEFAULT_INSURANCE_URL),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            persistence: PersistenceConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl IntegrationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: IntegrationConfig =
            toml::from_str(text).context("Failed to parse TOML")?;
        if config.insurance.base_url.is_empty() {
            config.insurance.base_url = DEFAULT_INSURANCE_URL.to_string();
        }
        if config.enterprise.base_url.is_empty() {
            config.enterprise.base_url = DEFAULT_ENTERPRISE_URL.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    /// Defaults with both live sources switched off
    pub fn offline() -> Self {
        let mut config = Self::default();
        config.enterprise.enabled = false;
        config.insurance.enabled = false;
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 || self.retry.max_attempts > MAX_ATTEMPTS {
            bail!(
                "retry.max_attempts must be between 1 and {}, got {}",
                MAX_ATTEMPTS,
                self.retry.max_attempts
            );
        }
        if self.retry.multiplier == 0 {
            bail!("retry.multiplier must be at least 1");
        }
        for (name, source) in [("enterprise", &self.enterprise), ("insurance", &self.insurance)] {
            if source.timeout == 0 {
                bail!("{}.timeout must be at least 1 second", name);
            }
            if source.enabled
                && !(source.base_url.starts_with("http://") || source.base_url.starts_with("https://"))
            {
                bail!("{}.base_url must be an http(s) URL, got {:?}", name, source.base_url);
            }
        }
        if self.batch.workers == 0 {
            bail!("batch.workers must be at least 1");
        }
        Ok(())
    }

    pub fn enterprise_policy(&self) -> RetryPolicy {
        self.retry.policy(self.enterprise.timeout())
    }

    pub fn insurance_policy(&self) -> RetryPolicy {
        self.retry.policy(self.insurance.timeout())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl SourceConfig {
    fn with_url(base_url: &str) -> Self {
        SourceConfig {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            enabled: true,
            base_url: String::new(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub multiplier: u32,
}

impl RetryConfig {
    pub fn policy(&self, per_attempt_timeout: Duration) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.backoff_ms),
            per_attempt_timeout,
        )
        .with_multiplier(self.multiplier)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: MAX_ATTEMPTS,
            backoff_ms: 500,
            multiplier: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: false,
            ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    /// SQLite database; unset means no database sink
    pub sqlite_path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            enabled: false,
            output_dir: PathBuf::from("output"),
            sqlite_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig { workers: 4 }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}
