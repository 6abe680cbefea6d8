//! Shared building blocks for Home Sentry: the settings model and its
//! on-disk store, input validation, link addresses, runtime paths and the
//! persisted sentry state.

pub mod durable;
pub mod error;
pub mod mac;
pub mod paths;
pub mod settings;
pub mod state;
pub mod store;
pub mod validate;

pub use error::{SettingsError, StateError, ValidationError};
pub use mac::MacAddress;
pub use settings::{NtfySettings, Settings, ShutdownAction};
pub use state::{FileStateStore, SentryState};
pub use store::FileSettingsStore;
