//! Rewriter configuration: which marker declarations are active and
//! whether rewritten classes are dumped.
//!
//! Loaded from TOML (`stitch.toml`) or from the option pairs a host
//! compiler passes to its plugins.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Package holding the marker library.
pub const MARKER_PACKAGE: &str = "stitch";

/// Simple names of the markers the rewriter understands.
pub const MARKER_NAMES: [&str; 5] = [
    "proxyDelegate",
    "lazyDelegate",
    "mixin",
    "ErasableDelegate",
    "DataLike",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    /// Fully-qualified names of the active markers.
    pub markers: Vec<String>,
    /// Report each rewritten class as a WARNING.
    pub dump_rewritten: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            markers: MARKER_NAMES
                .iter()
                .map(|name| format!("{MARKER_PACKAGE}.{name}"))
                .collect(),
            dump_rewritten: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("bad plugin option `{0}`")]
    BadOption(String),
}

impl RewriteConfig {
    /// Read and parse a configuration file.
    pub fn from_file(path: &Path) -> Result<RewriteConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse a configuration from TOML text. Missing keys keep their
    /// defaults.
    pub fn from_str(content: &str) -> Result<RewriteConfig, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Build a configuration from `key=value` plugin options.
    ///
    /// `marker=<fq name>` may repeat; when present the listed markers
    /// replace the defaults. `dump=<bool>` toggles class dumps.
    pub fn from_options<K, V>(options: &[(K, V)]) -> Result<RewriteConfig, ConfigError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = RewriteConfig::default();
        let mut markers = Vec::new();
        for (key, value) in options {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "marker" if !value.is_empty() => markers.push(value.to_string()),
                "dump" => {
                    config.dump_rewritten = value
                        .parse()
                        .map_err(|_| ConfigError::BadOption(format!("{key}={value}")))?;
                }
                _ => return Err(ConfigError::BadOption(format!("{key}={value}"))),
            }
        }
        if !markers.is_empty() {
            config.markers = markers;
        }
        Ok(config)
    }
}
