use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::transport::CurlOptions;

/// Curl transport tunables (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurlConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort a transfer slower than this many bytes/s for `low_speed_time_secs`.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
    /// Optional User-Agent header.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for CurlConfig {
    fn default() -> Self {
        let opts = CurlOptions::default();
        Self {
            connect_timeout_secs: opts.connect_timeout.as_secs(),
            low_speed_limit: opts.low_speed_limit,
            low_speed_time_secs: opts.low_speed_time.as_secs(),
            user_agent: None,
        }
    }
}

impl From<&CurlConfig> for CurlOptions {
    fn from(cfg: &CurlConfig) -> Self {
        CurlOptions {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            low_speed_limit: cfg.low_speed_limit,
            low_speed_time: Duration::from_secs(cfg.low_speed_time_secs),
            user_agent: cfg.user_agent.clone(),
            ..CurlOptions::default()
        }
    }
}

/// Global configuration loaded from `~/.config/pget/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of fetches in flight at once within a batch.
    pub max_concurrency: usize,
    /// Deadline for a whole batch, in seconds from its start (0 = already expired).
    pub timeout_secs: f64,
    /// Optional curl settings; if missing, built-in defaults are used.
    #[serde(default)]
    pub curl: Option<CurlConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            timeout_secs: 300.0,
            curl: None,
        }
    }
}

impl FetchConfig {
    /// Batch timeout as a `Duration`; rejects negative or non-finite values.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.timeout_secs)
            .map_err(|_| ConfigError::InvalidTimeout(self.timeout_secs))
    }

    /// Curl options from the `[curl]` section, or defaults.
    pub fn curl_options(&self) -> CurlOptions {
        self.curl.as_ref().map(CurlOptions::from).unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<FetchConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: FetchConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
