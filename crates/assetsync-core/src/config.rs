use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per transfer (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.25,
            max_delay_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/assetsync/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum number of concurrent asset transfers.
    pub max_concurrent: usize,
    /// Checkpoint the temp manifest every time the per-file percent crosses a multiple of this.
    pub save_point_interval: u32,
    /// Suffix appended to the storage root's name to form the in-flight root.
    pub temp_package_suffix: String,
    /// Suffix for partially received files before they are renamed into place.
    pub transfer_temp_suffix: String,
    /// Continue partial transfers with a Range request when the server allows it.
    pub allow_resume: bool,
    /// Connect timeout for a single transfer, in seconds.
    pub connect_timeout_secs: u64,
    /// Overall timeout for a single transfer, in seconds.
    pub transfer_timeout_secs: u64,
    /// Cadence of the async tick driver, in milliseconds.
    pub tick_interval_ms: u64,
    /// Worker threads per decompression category.
    #[serde(default = "default_decompress_workers")]
    pub decompress_workers: usize,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_decompress_workers() -> usize {
    1
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 32,
            save_point_interval: 10,
            temp_package_suffix: "_temp".to_string(),
            transfer_temp_suffix: ".part".to_string(),
            allow_resume: true,
            connect_timeout_secs: 30,
            transfer_timeout_secs: 3600,
            tick_interval_ms: 100,
            decompress_workers: default_decompress_workers(),
            retry: None,
        }
    }
}

impl SyncConfig {
    /// Retry policy from the `[retry]` section, or the built-in default.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryConfig::to_policy)
            .unwrap_or_default()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("assetsync")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SyncConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SyncConfig = toml::from_str(&data)?;
    Ok(cfg)
}
