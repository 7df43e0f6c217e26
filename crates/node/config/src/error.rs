//! Configuration error types.

use std::path::PathBuf;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize configuration to TOML.
    #[error("failed to serialize config to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The initial state root is not a 32 byte hex string.
    #[error("invalid init_state_root {0:?}: expected 32 bytes of hex")]
    InvalidStateRoot(String),

    /// The configured storage backend is not built in.
    #[error("unsupported db_backend {0:?}")]
    UnsupportedBackend(String),

    /// A numeric option is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Option name.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}
