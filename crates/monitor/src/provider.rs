//! Where the monitor reads its configuration and keeps its durable state.

use anyhow::Context;
use home_sentry_common::{FileSettingsStore, FileStateStore, SentryState, Settings};
use tracing::warn;

/// Configuration source consulted on every poll.
pub trait SettingsProvider: Send + Sync {
    fn load(&self) -> anyhow::Result<Settings>;

    fn set_paused(&self, paused: bool) -> anyhow::Result<()>;
}

/// Durable home of the "device seen at least once" flag.
pub trait StateStore: Send + Sync {
    /// Unreadable state counts as "never seen".
    fn load_phone_ever_seen(&self) -> bool;

    fn save_phone_ever_seen(&self, seen: bool) -> anyhow::Result<()>;
}

impl SettingsProvider for FileSettingsStore {
    fn load(&self) -> anyhow::Result<Settings> {
        FileSettingsStore::load(self)
            .with_context(|| format!("loading settings from {}", self.path().display()))
    }

    fn set_paused(&self, paused: bool) -> anyhow::Result<()> {
        FileSettingsStore::set_paused(self, paused)
            .with_context(|| format!("saving pause flag to {}", self.path().display()))?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load_phone_ever_seen(&self) -> bool {
        match self.load() {
            Ok(state) => state.phone_ever_seen,
            Err(err) => {
                warn!(error = %err, "sentry state unreadable; treating device as never seen");
                false
            }
        }
    }

    fn save_phone_ever_seen(&self, seen: bool) -> anyhow::Result<()> {
        self.save(&SentryState {
            phone_ever_seen: seen,
        })
        .with_context(|| format!("saving sentry state to {}", self.path().display()))
    }
}
