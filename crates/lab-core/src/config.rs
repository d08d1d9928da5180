//! Laboratory configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of experiments per parallel batch
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default per-experiment timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds an unusable value
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Laboratory configuration
///
/// Missing TOML fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaboratoryConfig {
    /// Laboratory name, shown in reports
    pub name: String,
    /// Run experiments in batches instead of one at a time
    pub parallel: bool,
    /// Experiments per batch in parallel mode
    pub max_parallel: usize,
    /// Timeout for experiments that do not set their own
    pub default_timeout_ms: u64,
    /// Run teardown on every experiment after a completed run
    pub auto_cleanup: bool,
}

impl LaboratoryConfig {
    /// Create default configuration with a name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` if a value fails validation
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Read` if the file cannot be read
    /// - Any error from [`LaboratoryConfig::from_toml_str`]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check field values
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if `max_parallel` or `default_timeout_ms` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid {
                field: "max_parallel",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "default_timeout_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// With name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With parallel mode
    #[inline]
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// With batch size
    #[inline]
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// With default timeout
    #[inline]
    #[must_use]
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// With auto cleanup
    #[inline]
    #[must_use]
    pub fn with_auto_cleanup(mut self, auto_cleanup: bool) -> Self {
        self.auto_cleanup = auto_cleanup;
        self
    }

    /// Default timeout as a duration
    #[inline]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for LaboratoryConfig {
    fn default() -> Self {
        Self {
            name: "Laboratory".to_string(),
            parallel: false,
            max_parallel: DEFAULT_MAX_PARALLEL,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            auto_cleanup: true,
        }
    }
}
