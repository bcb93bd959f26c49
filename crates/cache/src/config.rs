//! Cache configuration for the resource cache and its pressure policy.
//!
//! Configuration can be loaded from a file, environment variables, or
//! created programmatically. Capacity is fixed once a cache is constructed;
//! there is no hot reconfiguration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::pressure::PressurePolicy;

/// Default number of resident playback resources per feed surface
pub const DEFAULT_CAPACITY: usize = 5;

/// Configuration for the resource cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of resident resources (always >= 1)
    pub capacity: usize,
    /// How many resources one memory pressure signal sheds
    pub pressure_policy: PressurePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            pressure_policy: PressurePolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given capacity and the default policy.
    ///
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self::default().with_capacity(capacity)
    }

    /// Sets the capacity, clamping 0 to 1.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = clamp_capacity(capacity);
        self
    }

    /// Sets the memory pressure policy.
    pub fn with_pressure_policy(mut self, policy: PressurePolicy) -> Self {
        self.pressure_policy = policy;
        self
    }

    /// Returns the default configuration file path for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/clipfeed/cache.toml
    /// - Linux: ~/.config/clipfeed/cache.toml
    /// - Windows: %APPDATA%\clipfeed\cache.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("clipfeed").join("cache.toml")
        } else {
            PathBuf::from("clipfeed/cache.toml")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CLIPFEED_CACHE_CAPACITY`: resident resource limit (default: 5)
    /// - `CLIPFEED_PRESSURE_POLICY`: `single`, `count:N` or `all-but-mru`
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CLIPFEED_CACHE_CAPACITY") {
            let capacity = val
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("CLIPFEED_CACHE_CAPACITY".to_string()))?;
            config.capacity = clamp_capacity(capacity);
        }

        if let Ok(val) = std::env::var("CLIPFEED_PRESSURE_POLICY") {
            config.pressure_policy = val
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CLIPFEED_PRESSURE_POLICY".to_string()))?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// capacity = 5
    /// pressure_policy = "single"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "capacity" => {
                        let capacity = value
                            .parse::<usize>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
                        config.capacity = clamp_capacity(capacity);
                    }
                    "pressure_policy" => {
                        config.pressure_policy = value.parse()?;
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), self.to_toml())?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> String {
        format!(
            "# clipfeed resource cache\n\
             capacity = {}\n\
             pressure_policy = \"{}\"\n",
            self.capacity, self.pressure_policy
        )
    }
}

fn clamp_capacity(capacity: usize) -> usize {
    if capacity == 0 {
        warn!("cache capacity 0 is invalid, clamping to 1");
        1
    } else {
        capacity
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
