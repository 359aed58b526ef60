// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf, str::FromStr, time::Duration};
use tracing::{debug, info};
use url::Url;

pub const CONFIG_ENV: &str = "LAPTIME_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "laptime_tracker.yaml";

/// Runtime settings. Every field has a default, so an empty file (or none)
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub timing_path: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub database_path: PathBuf,
    /// Race to record into. `None` picks the newest active race.
    pub race_id: Option<i64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://www.livetiming.pedalcarracing.info/".to_string(),
            timing_path: "timing-full.php".to_string(),
            timeout_secs: 10,
            poll_interval_secs: 5,
            database_path: PathBuf::from("laptime_tracker.db"),
            race_id: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}={:?}: {}", key, v, e)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load from `$LAPTIME_CONFIG` (or `laptime_tracker.yaml`), then apply
    /// `LAPTIME_*` environment overrides.
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut cfg = Self::from_file(Path::new(&path))?;
        cfg.apply_env()?;
        cfg.validate()?;
        info!(url = %cfg.timing_url()?, db = %cfg.database_path.display(), "configuration loaded");
        Ok(cfg)
    }

    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {:?}", path))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = env::var("LAPTIME_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = env::var("LAPTIME_TIMING_PATH") {
            self.timing_path = v;
        }
        if let Ok(v) = env::var("LAPTIME_DATABASE") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = env_parse("LAPTIME_TIMEOUT_SECS")? {
            self.timeout_secs = v;
        }
        if let Some(v) = env_parse("LAPTIME_POLL_INTERVAL_SECS")? {
            self.poll_interval_secs = v;
        }
        if let Some(v) = env_parse("LAPTIME_RACE_ID")? {
            self.race_id = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        self.timing_url()?;
        Ok(())
    }

    /// `base_url` joined with `timing_path`.
    pub fn timing_url(&self) -> Result<Url> {
        let base = Url::parse(&self.base_url)
            .with_context(|| format!("parsing base_url {:?}", self.base_url))?;
        base.join(&self.timing_path)
            .with_context(|| format!("joining {:?} onto {}", self.timing_path, base))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
