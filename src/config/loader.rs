use super::types::SimConfig;
use crate::io::SimPaths;
use crate::{Result, SimError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file name, looked up in the working directory and
/// then in the user config directory
pub const DEFAULT_CONFIG_FILE: &str = "tufsim.yaml";

/// Configuration loader for simulation settings
pub struct ConfigLoader {
    /// Fail when the requested file is absent instead of using defaults
    strict: bool,
}

impl ConfigLoader {
    /// Create new config loader
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Require the configuration file to exist
    pub fn with_strict_validation(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Load configuration from `path`, falling back to defaults when the file
    /// is absent (unless strict).
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<SimConfig> {
        let path = path.as_ref();

        let config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                SimError::Config(format!("Failed to read config file {}: {}", path.display(), e))
            })?;
            debug!(path = %path.display(), "loaded configuration file");
            serde_yaml_ng::from_str(&contents).map_err(|e| {
                SimError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
            })?
        } else if self.strict {
            return Err(SimError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            SimConfig::default()
        };

        self.validate(&config)?;
        Ok(config)
    }

    /// Load `tufsim.yaml` from the working directory or, failing that, from
    /// the user config directory
    pub fn load_default(&self) -> Result<SimConfig> {
        let current_dir = std::env::current_dir()?;
        let user_dir = SimPaths::user_config_dir().ok();
        self.load(default_config_path(&current_dir, user_dir.as_deref()))
    }

    /// Validate configuration values
    pub fn validate(&self, config: &SimConfig) -> Result<()> {
        if config.since >= config.until {
            return Err(SimError::Config(format!(
                "Window start {} must precede window end {}",
                config.since, config.until
            )));
        }

        if !config.frequency.is_finite() || config.frequency <= 0.0 {
            return Err(SimError::Config(format!(
                "Frequency must be a positive number, got {}",
                config.frequency
            )));
        }

        if let Some(limit) = config.time_limit_seconds {
            if limit <= 0 {
                return Err(SimError::Config(format!(
                    "Time limit must be positive, got {}",
                    limit
                )));
            }
        }

        if config.pypi_directory.as_os_str().is_empty()
            || config.output_directory.as_os_str().is_empty()
        {
            return Err(SimError::Config(
                "pypi_directory and output_directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// First existing default config file; the working-directory one when none exists
fn default_config_path(current_dir: &Path, user_dir: Option<&Path>) -> PathBuf {
    let local = current_dir.join(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        return local;
    }
    match user_dir.map(|dir| dir.join(DEFAULT_CONFIG_FILE)) {
        Some(user) if user.is_file() => user,
        _ => local,
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
