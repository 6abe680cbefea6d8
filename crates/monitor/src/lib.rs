//! The Home Sentry core: decides on every poll whether the monitored device
//! is still on the home network and escalates a sustained absence into a
//! cancellable protective action.
//!
//! OS and network access sit behind traits ([`NetworkProbe`],
//! [`HostActions`], [`SettingsProvider`], [`StateStore`],
//! [`RemoteConnector`]) so the state machine can be driven by fakes.

pub mod actions;
mod countdown;
pub mod error;
pub mod monitor;
pub mod presence;
pub mod probe;
pub mod provider;
pub mod remote;
pub mod retry;
pub mod signal;
pub mod status;

pub use actions::{DryRunActions, HostActions, SystemActions};
pub use countdown::{CancelSource, CountdownOutcome};
pub use error::{ActionError, CommandError, ProbeError};
pub use monitor::{CycleReport, Monitor, MonitorContext, MonitorSnapshot, PinOutcome};
pub use presence::{NetworkDevice, NetworkName, PresenceCheck, PresenceDetector};
pub use probe::{NeighborEntry, NetworkProbe, SystemProbe};
pub use provider::{SettingsProvider, StateStore};
pub use remote::{
    CancelListener, NtfyConnector, NtfyRemote, RemoteCancel, RemoteConnector, RemoteLink,
    StatusNotice,
};
pub use retry::{retry, retry_until, RetryConfig};
pub use signal::Signal;
pub use status::{SentryStatus, StatusObserver};
