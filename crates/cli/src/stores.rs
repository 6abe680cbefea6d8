use std::path::Path;

use anyhow::{Context, Result};
use home_sentry_common::paths::{ensure_dir, STATE_FILE};
use home_sentry_common::{FileSettingsStore, FileStateStore};

/// Settings and state files for one invocation.
///
/// With `--config` the state file lives next to the given settings file so
/// separate configurations never share first-sighting state.
pub struct Stores {
    pub settings: FileSettingsStore,
    pub state: FileStateStore,
}

impl Stores {
    pub fn open(config: Option<&Path>) -> Result<Self> {
        let stores = match config {
            Some(path) => {
                let state_path = path.with_file_name(STATE_FILE);
                Self {
                    settings: FileSettingsStore::new(path),
                    state: FileStateStore::new(state_path),
                }
            }
            None => Self {
                settings: FileSettingsStore::open_default()?,
                state: FileStateStore::open_default()
                    .context("cannot resolve runtime directory")?,
            },
        };
        if let Some(dir) = stores.settings.path().parent() {
            if !dir.as_os_str().is_empty() {
                ensure_dir(dir)
                    .with_context(|| format!("cannot create {}", dir.display()))?;
            }
        }
        Ok(stores)
    }
}
