//! The cancellable delay between escalation and the protective action.

use std::future::pending;
use std::time::Duration;

use home_sentry_common::{Settings, ShutdownAction};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::monitor::Monitor;
use crate::remote::{CancelListener, RemoteCancel, RemoteLink, StatusNotice};
use crate::status::SentryStatus;

const ALERT_PERIOD: Duration = Duration::from_secs(2);
/// Extra time for manual intervention once a PIN-gated countdown expires.
const PIN_WINDOW: Duration = Duration::from_secs(10);

/// Who stopped a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    Local,
    Remote(RemoteCancel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Executed(ShutdownAction),
    Cancelled(CancelSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Alerts every two seconds until the delay runs out.
    Counting,
    /// Delay over, PIN required: fixed window before anything happens.
    PinWindow,
    /// Window over, still no PIN: wait for one or a cancel.
    AwaitingPin,
}

enum Commit {
    Go,
    /// A PIN is still needed.
    Blocked,
    /// Someone cancelled first.
    Lost,
}

/// Next remote cancel; never resolves when there is no (open) listener.
async fn next_remote(listener: &mut Option<CancelListener>) -> RemoteCancel {
    if let Some(listener) = listener {
        if let Some(cancel) = listener.recv().await {
            return cancel;
        }
    }
    pending().await
}

impl Monitor {
    pub(crate) async fn run_countdown(&self, settings: &Settings) -> CountdownOutcome {
        let action = settings.shutdown_action;
        let delay = settings.shutdown_delay();
        let delay_secs = settings.shutdown_delay_secs;
        let require_pin = settings.pin_required();

        let cancel = {
            let mut state = self.lock();
            state.shutdown_pending = true;
            state.awaiting_pin = false;
            state.pin_verified = false;
            state.countdown_settings = Some(settings.clone());
            state.cancel.clone()
        };
        // The clock starts before any network round trip.
        let deadline = Instant::now() + delay;
        warn!(%action, delay_secs, "device missing; protective action scheduled");

        self.ctx.actions.notify(
            "Home Sentry Alert",
            &format!(
                "Phone not detected! {} in {} seconds. Cancel to stop it.",
                action.label(),
                delay_secs
            ),
        );
        let remote = self.ctx.remote.connect(settings);
        let mut listener = match &remote {
            Some(link) => open_cancel_listener(link.as_ref(), action, delay_secs).await,
            None => None,
        };
        self.ctx.actions.alert();

        let mut ticker = interval_at(Instant::now() + ALERT_PERIOD, ALERT_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let timer = sleep_until(deadline);
        let window = sleep_until(deadline + PIN_WINDOW);
        tokio::pin!(timer, window);
        let mut phase = Phase::Counting;
        let mut remaining = delay_secs;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.fired() => break CountdownOutcome::Cancelled(CancelSource::Local),

                request = next_remote(&mut listener) => {
                    break self.accept_remote_cancel(request, remote.as_deref(), settings).await;
                }

                _ = &mut timer, if phase == Phase::Counting => {
                    match self.try_commit(require_pin) {
                        Commit::Go => break CountdownOutcome::Executed(action),
                        Commit::Lost => break CountdownOutcome::Cancelled(CancelSource::Local),
                        Commit::Blocked => {
                            info!("countdown expired; waiting for shutdown PIN");
                            self.ctx.actions.notify(
                                "Home Sentry",
                                &format!("Enter PIN to proceed with {}", action.label()),
                            );
                            phase = Phase::PinWindow;
                        }
                    }
                }

                _ = &mut window, if phase == Phase::PinWindow => {
                    match self.try_commit(require_pin) {
                        Commit::Go => break CountdownOutcome::Executed(action),
                        Commit::Lost => break CountdownOutcome::Cancelled(CancelSource::Local),
                        Commit::Blocked => {
                            warn!("no PIN entered; holding protective action until PIN or cancel");
                            phase = Phase::AwaitingPin;
                        }
                    }
                }

                _ = self.pin_entered.notified(), if phase == Phase::AwaitingPin => {
                    match self.try_commit(require_pin) {
                        Commit::Go => break CountdownOutcome::Executed(action),
                        Commit::Lost => break CountdownOutcome::Cancelled(CancelSource::Local),
                        Commit::Blocked => {}
                    }
                }

                _ = ticker.tick(), if phase == Phase::Counting => {
                    remaining = remaining.saturating_sub(ALERT_PERIOD.as_secs());
                    self.ctx.actions.alert();
                    info!(remaining_secs = remaining, "shutdown countdown");
                }
            }
        };

        drop(listener);
        {
            let mut state = self.lock();
            state.awaiting_pin = false;
            state.pin_verified = false;
            state.countdown_settings = None;
        }

        match outcome {
            CountdownOutcome::Executed(action) => {
                warn!(%action, "executing protective action");
                if let Err(err) = self.ctx.actions.perform(action).await {
                    error!(%action, error = %err, "protective action failed");
                }
            }
            CountdownOutcome::Cancelled(source) => info!(?source, "countdown cancelled"),
        }
        outcome
    }

    /// Decide at the commit point, under the lock, whether the action may
    /// run. A cancel that already took the lock wins.
    fn try_commit(&self, require_pin: bool) -> Commit {
        let mut state = self.lock();
        if !state.shutdown_pending {
            return Commit::Lost;
        }
        if require_pin && !state.pin_verified {
            state.awaiting_pin = true;
            return Commit::Blocked;
        }
        state.shutdown_pending = false;
        state.awaiting_pin = false;
        Commit::Go
    }

    async fn accept_remote_cancel(
        &self,
        request: RemoteCancel,
        link: Option<&dyn RemoteLink>,
        settings: &Settings,
    ) -> CountdownOutcome {
        let status = match request {
            RemoteCancel::CancelAndPause => SentryStatus::Paused,
            RemoteCancel::CancelOnly => SentryStatus::Monitoring,
        };
        let won = {
            let mut state = self.lock();
            if state.shutdown_pending {
                state.clear_countdown();
                state.status = status;
                if request == RemoteCancel::CancelAndPause {
                    state.paused_override = Some(true);
                }
                true
            } else {
                false
            }
        };
        if !won {
            return CountdownOutcome::Cancelled(CancelSource::Local);
        }
        info!(%request, "shutdown cancelled remotely");
        self.notify(status);

        match request {
            RemoteCancel::CancelAndPause => {
                self.persist_paused(true);
                if let Some(link) = link {
                    if let Err(err) = link.send_paused_ack().await {
                        warn!(error = %format!("{err:#}"), "paused acknowledgement not sent");
                    }
                }
            }
            RemoteCancel::CancelOnly => {
                if let Some(link) = link {
                    let notice = StatusNotice {
                        status: SentryStatus::Monitoring.label().to_string(),
                        network: settings.home_ssid.clone(),
                        device: settings.device_label(),
                        paused: false,
                    };
                    if let Err(err) = link.send_status_notice(&notice).await {
                        warn!(error = %format!("{err:#}"), "status notice not sent");
                    }
                }
            }
        }
        CountdownOutcome::Cancelled(CancelSource::Remote(request))
    }
}

/// Send the shutdown notice, and listen for cancels only if it got through.
async fn open_cancel_listener(
    link: &dyn RemoteLink,
    action: ShutdownAction,
    delay_secs: u64,
) -> Option<CancelListener> {
    if let Err(err) = link.send_shutdown_notice(action.label(), delay_secs).await {
        warn!(
            error = %format!("{err:#}"),
            "shutdown notice not delivered; remote cancel unavailable"
        );
        return None;
    }
    match link.listen_for_cancel().await {
        Ok(listener) => Some(listener),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "remote cancel listener failed to start");
            None
        }
    }
}
