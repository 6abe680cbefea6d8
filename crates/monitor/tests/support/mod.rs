//! In-memory collaborators for driving the monitor without a network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use home_sentry_common::{MacAddress, Settings, ShutdownAction};
use home_sentry_monitor::{
    ActionError, CancelListener, HostActions, Monitor, MonitorContext, NetworkName,
    PresenceCheck, RemoteCancel, RemoteConnector, RemoteLink, SentryStatus, SettingsProvider,
    StateStore, StatusNotice,
};
use tokio::sync::mpsc;

pub const HOME: &str = "HomeNet";
pub const PHONE: MacAddress = MacAddress::new([0xa4, 0x83, 0xe7, 0x12, 0x34, 0x56]);

/// Settings for a machine at home watching [`PHONE`].
pub fn home_settings(grace_checks: u32, shutdown_delay_secs: u64) -> Settings {
    Settings {
        home_ssid: HOME.to_string(),
        device_mac: Some(PHONE),
        device_name: "pixel".to_string(),
        grace_checks,
        shutdown_delay_secs,
        ..Settings::default()
    }
}

#[derive(Default)]
pub struct FakeSettings {
    pub current: Mutex<Settings>,
    /// Number of upcoming loads that fail.
    pub failing_loads: AtomicUsize,
    pub pause_writes: Mutex<Vec<bool>>,
    /// Every `set_paused` fails and leaves the stored flag alone.
    pub fail_pause_writes: AtomicBool,
}

impl FakeSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: Mutex::new(settings),
            ..Self::default()
        }
    }
}

impl SettingsProvider for FakeSettings {
    fn load(&self) -> anyhow::Result<Settings> {
        let failing = self.failing_loads.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_loads.store(failing - 1, Ordering::SeqCst);
            bail!("settings file locked");
        }
        Ok(self.current.lock().unwrap().clone())
    }

    fn set_paused(&self, paused: bool) -> anyhow::Result<()> {
        if self.fail_pause_writes.load(Ordering::SeqCst) {
            bail!("settings file is read-only");
        }
        self.current.lock().unwrap().is_paused = paused;
        self.pause_writes.lock().unwrap().push(paused);
        Ok(())
    }
}

pub struct FakePresence {
    pub network: Mutex<NetworkName>,
    pub present: AtomicBool,
    pub checks: AtomicUsize,
}

impl Default for FakePresence {
    fn default() -> Self {
        Self {
            network: Mutex::new(NetworkName::Connected(HOME.to_string())),
            present: AtomicBool::new(false),
            checks: AtomicUsize::new(0),
        }
    }
}

impl FakePresence {
    pub fn set_network(&self, name: &str) {
        *self.network.lock().unwrap() = NetworkName::Connected(name.to_string());
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }
}

#[async_trait]
impl PresenceCheck for FakePresence {
    async fn current_network_name(&self) -> NetworkName {
        self.network.lock().unwrap().clone()
    }

    async fn is_device_present(&self, mac: &MacAddress, _ping_timeout: Duration) -> bool {
        assert_eq!(*mac, PHONE);
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.present.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeState {
    pub initially_seen: bool,
    pub saves: Mutex<Vec<bool>>,
    pub fail_saves: AtomicBool,
}

impl StateStore for FakeState {
    fn load_phone_ever_seen(&self) -> bool {
        self.initially_seen
    }

    fn save_phone_ever_seen(&self, seen: bool) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.saves.lock().unwrap().push(seen);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingActions {
    pub performed: Mutex<Vec<ShutdownAction>>,
    pub alerts: AtomicUsize,
    pub notices: Mutex<Vec<String>>,
}

#[async_trait]
impl HostActions for RecordingActions {
    async fn perform(&self, action: ShutdownAction) -> Result<(), ActionError> {
        self.performed.lock().unwrap().push(action);
        Ok(())
    }

    fn alert(&self) {
        self.alerts.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self, title: &str, body: &str) {
        self.notices.lock().unwrap().push(format!("{title}: {body}"));
    }
}

/// Remote channel that records what it sent and lets the test inject
/// cancel commands.
#[derive(Default)]
pub struct FakeLink {
    pub sent: Mutex<Vec<String>>,
    pub fail_shutdown_notice: AtomicBool,
    cancels: Mutex<Option<mpsc::Sender<RemoteCancel>>>,
}

impl FakeLink {
    /// False when nobody is listening.
    pub fn push_cancel(&self, cancel: RemoteCancel) -> bool {
        match self.cancels.lock().unwrap().as_ref() {
            Some(tx) => tx.try_send(cancel).is_ok(),
            None => false,
        }
    }

    pub fn listener_closed(&self) -> bool {
        self.cancels
            .lock()
            .unwrap()
            .as_ref()
            .map_or(true, |tx| tx.is_closed())
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteLink for FakeLink {
    async fn send_shutdown_notice(
        &self,
        action_label: &str,
        delay_secs: u64,
    ) -> anyhow::Result<()> {
        if self.fail_shutdown_notice.load(Ordering::SeqCst) {
            bail!("ntfy unreachable");
        }
        self.sent
            .lock()
            .unwrap()
            .push(format!("shutdown:{action_label}:{delay_secs}"));
        Ok(())
    }

    async fn send_paused_ack(&self) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push("paused".to_string());
        Ok(())
    }

    async fn send_resumed_ack(&self) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push("resumed".to_string());
        Ok(())
    }

    async fn send_status_notice(&self, notice: &StatusNotice) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(format!("status:{}:{}", notice.status, notice.device));
        Ok(())
    }

    async fn listen_for_cancel(&self) -> anyhow::Result<CancelListener> {
        let (tx, rx) = mpsc::channel(1);
        *self.cancels.lock().unwrap() = Some(tx);
        Ok(CancelListener::new(rx))
    }
}

/// Hands out the same [`FakeLink`] when enabled.
pub struct FakeConnector {
    pub link: Option<Arc<FakeLink>>,
}

impl RemoteConnector for FakeConnector {
    fn connect(&self, _settings: &Settings) -> Option<Arc<dyn RemoteLink>> {
        self.link
            .as_ref()
            .map(|link| Arc::clone(link) as Arc<dyn RemoteLink>)
    }
}

pub struct Harness {
    pub monitor: Arc<Monitor>,
    pub settings: Arc<FakeSettings>,
    pub presence: Arc<FakePresence>,
    pub state: Arc<FakeState>,
    pub actions: Arc<RecordingActions>,
    pub link: Option<Arc<FakeLink>>,
    pub statuses: Arc<Mutex<Vec<SentryStatus>>>,
}

impl Harness {
    pub fn new(settings: Settings, phone_ever_seen: bool) -> Self {
        Self::build(settings, phone_ever_seen, None)
    }

    pub fn with_remote(settings: Settings, phone_ever_seen: bool) -> Self {
        Self::build(settings, phone_ever_seen, Some(Arc::new(FakeLink::default())))
    }

    fn build(settings: Settings, phone_ever_seen: bool, link: Option<Arc<FakeLink>>) -> Self {
        let settings = Arc::new(FakeSettings::new(settings));
        let presence = Arc::new(FakePresence::default());
        let state = Arc::new(FakeState {
            initially_seen: phone_ever_seen,
            ..FakeState::default()
        });
        let actions = Arc::new(RecordingActions::default());
        let monitor = Arc::new(Monitor::new(MonitorContext {
            settings: settings.clone(),
            presence: presence.clone(),
            state_store: state.clone(),
            actions: actions.clone(),
            remote: Arc::new(FakeConnector { link: link.clone() }),
        }));

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&statuses);
        monitor.set_status_observer(Arc::new(move |status: SentryStatus| {
            log.lock().unwrap().push(status);
        }));

        Self {
            monitor,
            settings,
            presence,
            state,
            actions,
            link,
            statuses,
        }
    }

    pub fn statuses(&self) -> Vec<SentryStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn performed(&self) -> Vec<ShutdownAction> {
        self.actions.performed.lock().unwrap().clone()
    }

    pub fn link(&self) -> &FakeLink {
        self.link.as_deref().expect("harness built with a remote link")
    }

    /// Run one cycle with the current settings on a separate task.
    pub fn spawn_cycle(&self) -> tokio::task::JoinHandle<home_sentry_monitor::CycleReport> {
        let monitor = Arc::clone(&self.monitor);
        let settings = self.settings.current.lock().unwrap().clone();
        tokio::spawn(async move { monitor.run_cycle(&settings).await })
    }

    /// Let a spawned cycle run until its countdown has started.
    pub async fn until_pending(&self) {
        for _ in 0..1_000 {
            if self.monitor.is_shutdown_pending() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("countdown never started");
    }

    pub async fn cycle(&self) -> home_sentry_monitor::CycleReport {
        let settings = self.settings.current.lock().unwrap().clone();
        self.monitor.run_cycle(&settings).await
    }
}
