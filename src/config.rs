use crate::error::{ForemanError, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-subtask timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForemanConfig {
    /// Root directory for the feedback log, traces, and scratch space.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    #[serde(default)]
    pub feedback: FeedbackSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    /// Worker registry: name -> how to invoke it.
    #[serde(default)]
    pub workers: HashMap<String, WorkerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSettings {
    /// EMA smoothing factor for learned success rates.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Minimum observations before a learned rate beats the neutral prior.
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    #[serde(default = "default_model")]
    pub model: String,
    /// Flat token price used when a worker reports tokens but no cost.
    #[serde(default = "default_price")]
    pub usd_per_million_tokens: f64,
}

/// How a worker expects its input payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputStyle {
    /// JSON written to the worker's stdin.
    #[default]
    Stdin,
    /// JSON passed as the value of a single `--input` flag.
    Arg,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerSpec {
    /// Executable plus arguments, shell-words style. Absent for simulated workers.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub input: InputStyle,

    /// Simulated workers return a canned payload without spawning anything.
    #[serde(default)]
    pub simulated: bool,

    /// Per-worker override of the subtask timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_alpha() -> f64 {
    0.2
}

fn default_min_samples() -> u64 {
    5
}

fn default_model() -> String {
    "default".to_string()
}

fn default_price() -> f64 {
    9.0
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            min_samples: default_min_samples(),
        }
    }
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            usd_per_million_tokens: default_price(),
        }
    }
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            default_timeout_secs: default_timeout_secs(),
            feedback: FeedbackSettings::default(),
            pricing: PricingSettings::default(),
            workers: HashMap::new(),
        }
    }
}

impl ForemanConfig {
    /// Load from `<state-dir>/config.yaml`, overlaid with `FOREMAN_*` env vars.
    pub fn load() -> Result<Self> {
        let state_dir = Self::default_state_dir()?;
        Self::load_from(&state_dir.join("config.yaml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("FOREMAN").separator("__"));

        let settings = builder
            .build()
            .map_err(|e| ForemanError::Configuration(format!("Failed to build config: {}", e)))?;

        let config: ForemanConfig = settings.try_deserialize().map_err(|e| {
            ForemanError::Configuration(format!("Failed to deserialize config: {}", e))
        })?;

        Ok(config)
    }

    fn default_state_dir() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "foreman", "foreman").ok_or_else(|| {
            ForemanError::Configuration("Could not determine state directory".to_string())
        })?;

        let dir = project_dirs.data_dir().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Resolved state directory, created on first use.
    pub fn state_dir(&self) -> Result<PathBuf> {
        let dir = match &self.state_dir {
            Some(dir) => dir.clone(),
            None => Self::default_state_dir()?,
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn feedback_log_path(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join("feedback.jsonl"))
    }

    pub fn traces_dir(&self) -> Result<PathBuf> {
        let dir = self.state_dir()?.join("traces");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn scratch_dir(&self) -> Result<PathBuf> {
        let dir = self.state_dir()?.join("scratch");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}
