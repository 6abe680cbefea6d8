use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::durable::write_durable;
use crate::error::StateError;
use crate::paths::{runtime_dir, STATE_FILE};

/// Facts that must survive a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentryState {
    /// The monitored device has been detected at least once.
    #[serde(default)]
    pub phone_ever_seen: bool,
}

/// `sentry-state.json` on disk. Only the monitor loop writes it.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> io::Result<Self> {
        Ok(Self::new(runtime_dir()?.join(STATE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SentryState, StateError> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no sentry state yet");
                return Ok(SentryState::default());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&contents).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, state: &SentryState) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(state).map_err(|err| StateError::Write {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })?;
        write_durable(&self.path, &json).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
