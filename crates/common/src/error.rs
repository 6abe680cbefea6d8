use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A single field failed validation.
///
/// `field` is the settings key (or CLI argument) that was rejected and
/// `message` is suitable for showing to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Failures while reading or writing `settings.toml`.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The runtime directory could not be determined from the environment.
    #[error("cannot resolve runtime directory: {0}")]
    RuntimeDir(String),

    /// The settings file exists but could not be read.
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid TOML for the settings schema.
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialise settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Locking, writing or renaming the settings file failed.
    #[error("failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A requested change was rejected before anything was written.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Failures while reading or writing `sentry-state.json`.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse state {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write state {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
