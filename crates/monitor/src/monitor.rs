//! The escalation state machine.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use home_sentry_common::Settings;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::actions::HostActions;
use crate::countdown::CountdownOutcome;
use crate::presence::PresenceCheck;
use crate::provider::{SettingsProvider, StateStore};
use crate::remote::RemoteConnector;
use crate::signal::Signal;
use crate::status::{SentryStatus, StatusObserver};

const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Everything the monitor talks to.
#[derive(Clone)]
pub struct MonitorContext {
    pub settings: Arc<dyn SettingsProvider>,
    pub presence: Arc<dyn PresenceCheck>,
    pub state_store: Arc<dyn StateStore>,
    pub actions: Arc<dyn HostActions>,
    pub remote: Arc<dyn RemoteConnector>,
}

pub(crate) struct MonitorState {
    pub(crate) status: SentryStatus,
    pub(crate) grace_count: u32,
    pub(crate) phone_ever_seen: bool,
    pub(crate) shutdown_pending: bool,
    /// Fired by a local cancel, then replaced with a fresh one.
    pub(crate) cancel: Signal,
    pub(crate) awaiting_pin: bool,
    pub(crate) pin_verified: bool,
    /// Settings of the running countdown, for PIN checks.
    pub(crate) countdown_settings: Option<Settings>,
    /// Pause decided here but not yet seen in the settings file. Wins over
    /// the file until the file agrees or is edited.
    pub(crate) paused_override: Option<bool>,
    /// `is_paused` as read by the previous cycle.
    file_paused: Option<bool>,
}

impl MonitorState {
    /// Shared tail of every cancellation path.
    pub(crate) fn clear_countdown(&mut self) {
        self.shutdown_pending = false;
        self.grace_count = 0;
        self.awaiting_pin = false;
        self.pin_verified = false;
        self.countdown_settings = None;
    }

    /// Combine the file's pause flag with any in-memory override.
    fn effective_paused(&mut self, file_paused: bool) -> bool {
        let edited = self.file_paused.is_some_and(|seen| seen != file_paused);
        self.file_paused = Some(file_paused);
        if edited || self.paused_override == Some(file_paused) {
            self.paused_override = None;
        }
        self.paused_override.unwrap_or(file_paused)
    }
}

/// Point-in-time copy of the monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub status: SentryStatus,
    pub grace_count: u32,
    pub phone_ever_seen: bool,
    pub shutdown_pending: bool,
    pub awaiting_pin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    Accepted,
    Rejected,
    /// No countdown is waiting for a PIN.
    NotAwaiting,
}

/// What one poll cycle decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReport {
    Paused,
    Roaming,
    DeviceNotConfigured,
    Present,
    WaitingForPhone,
    Grace { count: u32, threshold: u32 },
    Escalated(CountdownOutcome),
}

pub struct Monitor {
    pub(crate) ctx: MonitorContext,
    state: Mutex<MonitorState>,
    observer: Mutex<Option<Arc<dyn StatusObserver>>>,
    pub(crate) pin_entered: Notify,
}

impl Monitor {
    pub fn new(ctx: MonitorContext) -> Self {
        let phone_ever_seen = ctx.state_store.load_phone_ever_seen();
        debug!(phone_ever_seen, "monitor created");
        Self {
            ctx,
            state: Mutex::new(MonitorState {
                status: SentryStatus::Roaming,
                grace_count: 0,
                phone_ever_seen,
                shutdown_pending: false,
                cancel: Signal::new(),
                awaiting_pin: false,
                pin_verified: false,
                countdown_settings: None,
                paused_override: None,
                file_paused: None,
            }),
            observer: Mutex::new(None),
            pin_entered: Notify::new(),
        }
    }

    /// A panic elsewhere must not take protection down with it.
    pub(crate) fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces any previously registered observer.
    pub fn set_status_observer(&self, observer: Arc<dyn StatusObserver>) {
        *self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Must be called without the state lock held.
    pub(crate) fn notify(&self, status: SentryStatus) {
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer.on_status_changed(status);
        }
    }

    /// Apply `change` under the lock, then report the status it returns.
    pub(crate) fn transition<R>(
        &self,
        change: impl FnOnce(&mut MonitorState) -> (SentryStatus, R),
    ) -> R {
        let (status, result) = {
            let mut state = self.lock();
            let (status, result) = change(&mut state);
            state.status = status;
            (status, result)
        };
        self.notify(status);
        result
    }

    pub fn status(&self) -> SentryStatus {
        self.lock().status
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let state = self.lock();
        MonitorSnapshot {
            status: state.status,
            grace_count: state.grace_count,
            phone_ever_seen: state.phone_ever_seen,
            shutdown_pending: state.shutdown_pending,
            awaiting_pin: state.awaiting_pin,
        }
    }

    pub fn is_shutdown_pending(&self) -> bool {
        self.lock().shutdown_pending
    }

    /// Cancel a running countdown. Returns false when none was running.
    pub fn cancel_shutdown(&self) -> bool {
        {
            let mut state = self.lock();
            if !state.shutdown_pending {
                return false;
            }
            state.clear_countdown();
            state.status = SentryStatus::Monitoring;
            mem::take(&mut state.cancel).fire();
        }
        info!("shutdown cancelled locally");
        self.notify(SentryStatus::Monitoring);
        true
    }

    /// Offer the PIN that releases a countdown held for confirmation.
    pub fn submit_pin(&self, pin: &str) -> PinOutcome {
        {
            let mut state = self.lock();
            if !(state.shutdown_pending && state.awaiting_pin) {
                return PinOutcome::NotAwaiting;
            }
            let verified = state
                .countdown_settings
                .as_ref()
                .is_some_and(|settings| settings.verify_pin(pin));
            if !verified {
                warn!("incorrect shutdown PIN entered");
                return PinOutcome::Rejected;
            }
            state.pin_verified = true;
        }
        info!("shutdown PIN accepted");
        self.pin_entered.notify_one();
        PinOutcome::Accepted
    }

    /// Stop protecting and persist the pause flag. A running countdown is
    /// cancelled. The pause holds even if the settings file cannot be
    /// written.
    pub fn pause(&self) {
        let cancelled = self.transition(|state| {
            state.paused_override = Some(true);
            let pending = state.shutdown_pending;
            if pending {
                state.clear_countdown();
                mem::take(&mut state.cancel).fire();
            }
            (SentryStatus::Paused, pending)
        });
        if cancelled {
            info!("pause cancelled the running countdown");
        }
        self.persist_paused(true);
    }

    /// Clear the pause; the next cycle works out the status.
    pub fn resume(&self) {
        self.transition(|state| {
            state.paused_override = Some(false);
            (SentryStatus::Roaming, ())
        });
        self.persist_paused(false);
    }

    /// Pause state the monitor acts on when it differs from `settings`.
    pub fn paused_override(&self) -> Option<bool> {
        self.lock().paused_override
    }

    pub(crate) fn persist_paused(&self, paused: bool) {
        if let Err(err) = self.ctx.settings.set_paused(paused) {
            warn!(
                paused,
                error = %format!("{err:#}"),
                "could not persist pause flag; keeping it in memory"
            );
        }
    }

    /// One poll: decide the status from `settings` and the network, and
    /// run the countdown when the grace threshold is reached.
    pub async fn run_cycle(&self, settings: &Settings) -> CycleReport {
        let paused = self.lock().effective_paused(settings.is_paused);
        if paused {
            self.transition(|_| (SentryStatus::Paused, ()));
            return CycleReport::Paused;
        }

        let network = self.ctx.presence.current_network_name().await;
        if !network.matches_home(&settings.home_ssid) {
            debug!(%network, "not on the home network");
            self.transition(|state| {
                state.grace_count = 0;
                (SentryStatus::Roaming, ())
            });
            return CycleReport::Roaming;
        }

        let Some(mac) = settings.device_mac else {
            self.transition(|_| (SentryStatus::Roaming, ()));
            return CycleReport::DeviceNotConfigured;
        };

        let present = self
            .ctx
            .presence
            .is_device_present(&mac, settings.ping_timeout())
            .await;

        if present {
            let first_sighting = self.transition(|state| {
                state.grace_count = 0;
                let first = !state.phone_ever_seen;
                state.phone_ever_seen = true;
                (SentryStatus::Monitoring, first)
            });
            if first_sighting {
                info!(%mac, "device seen for the first time");
                if let Err(err) = self.ctx.state_store.save_phone_ever_seen(true) {
                    warn!(error = %format!("{err:#}"), "could not persist first sighting");
                }
            }
            return CycleReport::Present;
        }

        let threshold = settings.grace_checks.max(1);
        let grace = self.transition(|state| {
            if !state.phone_ever_seen {
                return (SentryStatus::WaitingForPhone, None);
            }
            state.grace_count += 1;
            let status = if state.grace_count >= threshold {
                SentryStatus::ShutdownImminent
            } else {
                SentryStatus::GracePeriod
            };
            (status, Some(state.grace_count))
        });

        match grace {
            None => {
                debug!(%mac, "device not seen yet; waiting");
                CycleReport::WaitingForPhone
            }
            Some(count) if count >= threshold => {
                warn!(count, threshold, "grace period exhausted");
                CycleReport::Escalated(self.run_countdown(settings).await)
            }
            Some(count) => {
                info!(count, threshold, "device missing");
                CycleReport::Grace { count, threshold }
            }
        }
    }

    /// Poll forever. Settings that fail to load skip the cycle; they are
    /// never read as "device absent".
    pub async fn start(&self) {
        let mut interval = FALLBACK_POLL_INTERVAL;
        info!("monitor started");
        loop {
            match self.ctx.settings.load() {
                Ok(settings) => {
                    interval = settings.poll_interval();
                    let report = self.run_cycle(&settings).await;
                    debug!(?report, "cycle complete");
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "settings unavailable; skipping cycle");
                }
            }
            sleep(interval).await;
        }
    }
}
