//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use slumber_core::{DayClock, EngineConfig, ValidationError, ValidatorConfig};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Snapshot read when `--input` is not given.
    pub input_path: PathBuf,

    /// UTC offset calendar days are evaluated in (e.g. "+02:00").
    pub utc_offset: String,

    /// Awake-scoring thresholds.
    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("input_path", &self.input_path)
            .field("utc_offset", &self.utc_offset)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            input_path: data_dir.join("events.jsonl"),
            utc_offset: "+00:00".to_string(),
            validator: ValidatorConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (SLUMBER_*, nested with __)
        figment = figment.merge(Env::prefixed("SLUMBER_").split("__"));

        figment.extract()
    }

    /// Day clock parsed from `utc_offset`.
    pub fn clock(&self) -> Result<DayClock, ValidationError> {
        self.utc_offset.parse()
    }

    /// Engine configuration derived from this config.
    pub fn engine_config(&self) -> Result<EngineConfig, ValidationError> {
        Ok(EngineConfig {
            clock: self.clock()?,
            validator: self.validator.clone(),
        })
    }
}

/// Returns the platform-specific config directory for slumber.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("slumber"))
}

/// Returns the platform-specific data directory for slumber.
///
/// On Linux: `~/.local/share/slumber`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("slumber"))
}
