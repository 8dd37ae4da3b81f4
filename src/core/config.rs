use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::core::events::ResetKind;
use crate::core::retry::RetryPolicy;

pub const CONFIG_FILE: &str = "polarity.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    /// One entry per announce target; defaults cover the weekly reset and
    /// Xur infographics.
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    #[serde(default)]
    pub retry_jitter: bool,

    /// Unset keeps a watch unbounded, matching the upstream publishing
    /// cadence being the only thing that ends it.
    #[serde(default)]
    pub watch_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub test_env: bool,

    /// With `test_env`, announce straight away instead of waiting for the
    /// infographic host to actually publish something new.
    #[serde(default)]
    pub trigger_without_url_update: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub trigger: ResetKind,
    pub gfx_url: String,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    17650
}
fn default_poll_interval_secs() -> u64 {
    10
}
fn default_retry_attempts() -> u32 {
    10
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_retry_multiplier() -> f64 {
    1.0
}

fn default_targets() -> Vec<TargetConfig> {
    vec![
        TargetConfig {
            name: "weekly-reset".to_string(),
            trigger: ResetKind::Weekly,
            gfx_url: "https://kyber3000.com/D2-Reset".to_string(),
        },
        TargetConfig {
            name: "xur".to_string(),
            trigger: ResetKind::Weekend,
            gfx_url: "https://kyber3000.com/D2-Xur".to_string(),
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            watcher: WatcherConfig::default(),
            debug: DebugConfig::default(),
            targets: default_targets(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_port: default_api_port(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            retry_multiplier: default_retry_multiplier(),
            retry_jitter: false,
            watch_timeout_secs: None,
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn watch_timeout(&self) -> Option<Duration> {
        self.watch_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_delay: Duration::from_secs(self.retry_delay_secs),
            multiplier: self.retry_multiplier,
            jitter: self.retry_jitter,
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            info!("No {CONFIG_FILE} found, using default configuration.");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path).await?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.watcher.poll_interval_secs >= 1,
            "watcher.poll_interval_secs must be at least 1"
        );
        anyhow::ensure!(
            self.watcher.retry_attempts >= 1,
            "watcher.retry_attempts must be at least 1"
        );

        let mut seen = HashSet::new();
        for target in &self.targets {
            let name = target.name.trim();
            anyhow::ensure!(!name.is_empty(), "target names must not be empty");
            anyhow::ensure!(
                name.chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_'),
                "target name '{}' must contain only alphanumeric characters, hyphens, and underscores",
                name
            );
            anyhow::ensure!(
                seen.insert(name.to_string()),
                "duplicate target name '{}'",
                name
            );
            Url::parse(&target.gfx_url)
                .with_context(|| format!("invalid gfx_url for target '{}'", name))?;
        }
        Ok(())
    }
}
