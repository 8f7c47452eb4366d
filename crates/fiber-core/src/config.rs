#![forbid(unsafe_code)]

//! Reconciler configuration.
//!
//! With the `config-file` feature a configuration can be read from TOML:
//!
//! ```toml
//! max_nested_updates = 20
//! default_lane = "default"
//! defer_passive_effects = false
//! warn_on_duplicate_keys = true
//! ```
//!
//! Missing keys keep their defaults.

use std::fmt;

use crate::lane::{Lane, Lanes};

/// Tunables for a [`Root`](crate::Root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Consecutive synchronous commits caused by render-phase updates before
    /// the root gives up and drops its pending work.
    /// Default: 50
    pub max_nested_updates: u32,

    /// Lane used by state updates issued outside [`Root::with_priority`](crate::Root::with_priority).
    /// Default: [`Lanes::SYNC`]
    pub default_lane: Lane,

    /// Run passive effects in a separate batch task after commit rather than
    /// inline at the end of commit.
    /// Default: true
    pub defer_passive_effects: bool,

    /// Log a warning when siblings share a key.
    /// Default: true
    pub warn_on_duplicate_keys: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_nested_updates: 50,
            default_lane: Lanes::SYNC,
            defer_passive_effects: true,
            warn_on_duplicate_keys: true,
        }
    }
}

impl ReconcilerConfig {
    #[must_use]
    pub fn with_max_nested_updates(mut self, limit: u32) -> Self {
        self.max_nested_updates = limit;
        self
    }

    #[must_use]
    pub fn with_default_lane(mut self, lane: Lane) -> Self {
        self.default_lane = lane;
        self
    }

    #[must_use]
    pub fn with_defer_passive_effects(mut self, defer: bool) -> Self {
        self.defer_passive_effects = defer;
        self
    }

    #[must_use]
    pub fn with_warn_on_duplicate_keys(mut self, warn: bool) -> Self {
        self.warn_on_duplicate_keys = warn;
        self
    }
}

/// A configuration file could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read.
    Io(String),
    /// The document is not valid TOML for this schema.
    Parse(String),
    /// `default_lane` does not name a single lane.
    UnknownLane(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read reconciler config: {msg}"),
            Self::Parse(msg) => write!(f, "invalid reconciler config: {msg}"),
            Self::UnknownLane(name) => write!(f, "unknown lane name: {name:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(feature = "config-file")]
mod file {
    use std::path::Path;

    use serde::Deserialize;

    use super::{ConfigError, ReconcilerConfig};
    use crate::lane::lane_from_name;

    #[derive(Debug, Default, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct ConfigFile {
        max_nested_updates: Option<u32>,
        default_lane: Option<String>,
        defer_passive_effects: Option<bool>,
        warn_on_duplicate_keys: Option<bool>,
    }

    impl ReconcilerConfig {
        /// Parse a TOML document on top of the defaults.
        pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
            let file: ConfigFile =
                toml::from_str(src).map_err(|e| ConfigError::Parse(e.to_string()))?;
            let mut config = Self::default();
            if let Some(limit) = file.max_nested_updates {
                config.max_nested_updates = limit;
            }
            if let Some(name) = file.default_lane {
                config.default_lane =
                    lane_from_name(&name).ok_or(ConfigError::UnknownLane(name))?;
            }
            if let Some(defer) = file.defer_passive_effects {
                config.defer_passive_effects = defer;
            }
            if let Some(warn) = file.warn_on_duplicate_keys {
                config.warn_on_duplicate_keys = warn;
            }
            Ok(config)
        }

        /// Read and parse a TOML file.
        pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
            let path = path.as_ref();
            let src = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
            Self::from_toml_str(&src)
        }
    }
}
