//! The remote command channel as the countdown sees it: send notices, and
//! listen for a cancel while the countdown runs.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use home_sentry_common::Settings;
use home_sentry_ntfy::{Command, NtfyClient, Since};
use tokio::sync::mpsc;
use tracing::warn;

pub use home_sentry_ntfy::StatusReport as StatusNotice;

/// Cancel commands accepted during a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCancel {
    CancelOnly,
    /// Cancel and persist the paused flag.
    CancelAndPause,
}

impl RemoteCancel {
    fn from_command(command: Command) -> Option<Self> {
        match command {
            Command::CancelOnly => Some(RemoteCancel::CancelOnly),
            Command::CancelAndPause => Some(RemoteCancel::CancelAndPause),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteCancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteCancel::CancelOnly => "cancel_only",
            RemoteCancel::CancelAndPause => "cancel_pause",
        })
    }
}

/// Stream of remote cancels for one countdown. Dropping it tears down
/// whatever is feeding it.
pub struct CancelListener {
    rx: mpsc::Receiver<RemoteCancel>,
    guard: Option<Box<dyn Send>>,
}

impl CancelListener {
    pub fn new(rx: mpsc::Receiver<RemoteCancel>) -> Self {
        Self { rx, guard: None }
    }

    /// Keep `guard` alive exactly as long as the listener.
    pub fn with_guard(mut self, guard: impl Send + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Next cancel, or `None` once the source has gone away.
    pub async fn recv(&mut self) -> Option<RemoteCancel> {
        self.rx.recv().await
    }
}

impl fmt::Debug for CancelListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelListener")
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

#[async_trait]
pub trait RemoteLink: Send + Sync {
    async fn send_shutdown_notice(&self, action_label: &str, delay_secs: u64)
        -> anyhow::Result<()>;

    async fn send_paused_ack(&self) -> anyhow::Result<()>;

    async fn send_resumed_ack(&self) -> anyhow::Result<()>;

    async fn send_status_notice(&self, notice: &StatusNotice) -> anyhow::Result<()>;

    /// Start listening for cancel commands. Only commands sent after the
    /// last shutdown notice are delivered, or after this call when no notice
    /// went out.
    async fn listen_for_cancel(&self) -> anyhow::Result<CancelListener>;
}

/// Builds a [`RemoteLink`] from the current settings, if one is configured.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, settings: &Settings) -> Option<Arc<dyn RemoteLink>>;
}

/// [`RemoteLink`] over an ntfy topic.
#[derive(Debug)]
pub struct NtfyRemote {
    client: NtfyClient,
    notice_cursor: Mutex<Option<Since>>,
}

impl NtfyRemote {
    pub fn new(client: NtfyClient) -> Self {
        Self {
            client,
            notice_cursor: Mutex::new(None),
        }
    }

    fn take_cursor(&self) -> Since {
        self.notice_cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(Since::now)
    }

    pub fn client(&self) -> &NtfyClient {
        &self.client
    }
}

#[async_trait]
impl RemoteLink for NtfyRemote {
    async fn send_shutdown_notice(
        &self,
        action_label: &str,
        delay_secs: u64,
    ) -> anyhow::Result<()> {
        let since = self
            .client
            .send_shutdown_notice(action_label, delay_secs)
            .await?;
        *self
            .notice_cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(since);
        Ok(())
    }

    async fn send_paused_ack(&self) -> anyhow::Result<()> {
        Ok(self.client.send_paused_ack().await?)
    }

    async fn send_resumed_ack(&self) -> anyhow::Result<()> {
        Ok(self.client.send_resumed_ack().await?)
    }

    async fn send_status_notice(&self, notice: &StatusNotice) -> anyhow::Result<()> {
        Ok(self.client.send_status_notice(notice).await?)
    }

    async fn listen_for_cancel(&self) -> anyhow::Result<CancelListener> {
        let (tx, rx) = mpsc::channel(1);
        let since = self.take_cursor();
        let guard = self.client.spawn_cancel_listener(since, move |command| {
            if let Some(cancel) = RemoteCancel::from_command(command) {
                let _ = tx.try_send(cancel);
            }
        });
        Ok(CancelListener::new(rx).with_guard(guard))
    }
}

/// Connects to ntfy when it is enabled and has a topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NtfyConnector;

impl RemoteConnector for NtfyConnector {
    fn connect(&self, settings: &Settings) -> Option<Arc<dyn RemoteLink>> {
        if !settings.ntfy.is_ready() {
            return None;
        }
        match NtfyClient::new(&settings.ntfy.server, &settings.ntfy.topic) {
            Ok(client) => Some(Arc::new(NtfyRemote::new(client))),
            Err(err) => {
                warn!(error = %err, "ntfy misconfigured; remote notices disabled");
                None
            }
        }
    }
}
