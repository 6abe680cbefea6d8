use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::command::Command;
use crate::error::NtfyError;
use crate::message::{parse_poll_body, published_id, Action, PollBatch, Publish, Since};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot sent in reply to a `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: String,
    pub network: String,
    pub device: String,
    pub paused: bool,
}

#[derive(Debug, Clone)]
pub struct NtfyClient {
    http: Client,
    server: String,
    topic: String,
}

impl NtfyClient {
    pub fn new(server: &str, topic: &str) -> Result<Self, NtfyError> {
        let server = server.trim().trim_end_matches('/').to_string();
        let topic = topic.trim().to_string();
        if !(server.starts_with("http://") || server.starts_with("https://")) {
            return Err(NtfyError::Config(format!(
                "server '{}' is not an http(s) URL",
                server
            )));
        }
        if topic.is_empty() {
            return Err(NtfyError::Config("topic is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent(concat!("home-sentry/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            server,
            topic,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Where action buttons post their command word.
    pub fn topic_url(&self) -> String {
        format!("{}/{}", self.server, self.topic)
    }

    fn poll_url(&self, since: &Since) -> String {
        format!("{}/json?poll=1&since={}", self.topic_url(), since.query_value())
    }

    /// Publish `payload` and return a cursor just past it, so a listener
    /// started afterwards sees only what was posted in reply. Falls back to
    /// the time before sending when the server does not echo the message.
    pub async fn publish(&self, payload: &Publish) -> Result<Since, NtfyError> {
        let sent_at = Since::now();
        let response = self.http.post(&self.server).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NtfyError::Status {
                code: status.as_u16(),
                body,
            });
        }
        let body = response.text().await.unwrap_or_default();
        info!(topic = %self.topic, title = %payload.title, "ntfy notification sent");
        Ok(published_id(&body).map_or(sent_at, Since::Message))
    }

    /// Recognised commands published after `since`.
    pub async fn poll_commands(&self, since: &Since) -> Result<PollBatch, NtfyError> {
        let response = self
            .http
            .get(self.poll_url(since))
            .timeout(POLL_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NtfyError::Status {
                code: status.as_u16(),
                body,
            });
        }
        let body = response.text().await?;
        let batch = parse_poll_body(&body);
        debug!(count = batch.commands.len(), "ntfy poll");
        Ok(batch)
    }

    fn payload(
        &self,
        title: &str,
        message: String,
        priority: u8,
        tags: &[&str],
        actions: Vec<Action>,
    ) -> Publish {
        Publish {
            topic: self.topic.clone(),
            title: title.to_string(),
            message,
            priority,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            actions,
        }
    }

    pub fn shutdown_notice(&self, action_label: &str, delay_secs: u64) -> Publish {
        let url = self.topic_url();
        self.payload(
            "🚨 Home Sentry Alert",
            format!(
                "Phone not detected! {} in {} seconds...",
                action_label, delay_secs
            ),
            5,
            &["warning", "computer", "rotating_light"],
            vec![
                Action::post_command("⏸ Cancel & Pause", &url, Command::CancelAndPause),
                Action::post_command("❌ Cancel Only", &url, Command::CancelOnly),
            ],
        )
    }

    pub fn status_notice(&self, report: &StatusReport) -> Publish {
        let url = self.topic_url();
        let (title, state) = if report.paused {
            ("⏸ Home Sentry Status", "PAUSED")
        } else {
            ("🟢 Home Sentry Status", report.status.as_str())
        };
        self.payload(
            title,
            format!(
                "Status: {}\nWiFi: {}\nPhone: {}",
                state, report.network, report.device
            ),
            3,
            &["house", "information_source"],
            vec![
                Action::post_command("⏸ Pause", &url, Command::Pause),
                Action::post_command("▶ Resume", &url, Command::Resume),
            ],
        )
    }

    pub fn paused_notice(&self) -> Publish {
        self.payload(
            "⏸ Protection Paused",
            "Home Sentry protection is paused. Send 'resume' or tap the button to resume."
                .to_string(),
            3,
            &["pause_button"],
            vec![Action::post_command(
                "▶ Resume Protection",
                &self.topic_url(),
                Command::Resume,
            )],
        )
    }

    pub fn resumed_notice(&self) -> Publish {
        self.payload(
            "▶ Protection Resumed",
            "Home Sentry is now monitoring your laptop.".to_string(),
            3,
            &["arrow_forward", "shield"],
            Vec::new(),
        )
    }

    pub fn test_notice(&self) -> Publish {
        let url = self.topic_url();
        self.payload(
            "✅ Home Sentry Test",
            "Notifications working! Commands: 'pause', 'resume', 'status'".to_string(),
            3,
            &["white_check_mark", "computer"],
            vec![
                Action::post_command("⏸ Pause", &url, Command::Pause),
                Action::post_command("📊 Status", &url, Command::Status),
            ],
        )
    }

    /// Returns the cursor to hand to [`NtfyClient::spawn_cancel_listener`].
    pub async fn send_shutdown_notice(
        &self,
        action_label: &str,
        delay_secs: u64,
    ) -> Result<Since, NtfyError> {
        self.publish(&self.shutdown_notice(action_label, delay_secs))
            .await
    }

    pub async fn send_status_notice(&self, report: &StatusReport) -> Result<(), NtfyError> {
        self.publish(&self.status_notice(report)).await.map(drop)
    }

    pub async fn send_paused_ack(&self) -> Result<(), NtfyError> {
        self.publish(&self.paused_notice()).await.map(drop)
    }

    pub async fn send_resumed_ack(&self) -> Result<(), NtfyError> {
        self.publish(&self.resumed_notice()).await.map(drop)
    }

    pub async fn send_test_notice(&self) -> Result<(), NtfyError> {
        self.publish(&self.test_notice()).await.map(drop)
    }
}
