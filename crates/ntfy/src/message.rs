use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::Command;

/// JSON body published to the server root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publish {
    pub topic: String,
    pub title: String,
    pub message: String,
    pub priority: u8,
    pub tags: Vec<String>,
    pub actions: Vec<Action>,
}

/// An `http` action button: tapping it posts `body` to `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub action: String,
    pub label: String,
    pub url: String,
    pub method: String,
    pub body: String,
    pub clear: bool,
}

impl Action {
    pub fn post_command(label: &str, topic_url: &str, command: Command) -> Self {
        Self {
            action: "http".to_string(),
            label: label.to_string(),
            url: topic_url.to_string(),
            method: "POST".to_string(),
            body: command.as_str().to_string(),
            clear: true,
        }
    }
}

/// One line of the `/json?poll=1` stream, or the body returned by a publish.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    id: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// A recognised command read from the topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub id: String,
    pub command: Command,
}

/// Where a poll starts reading the topic. Only messages published after
/// the cursor are returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Since {
    /// Everything after this message id.
    Message(String),
    /// Everything published at or after this unix time.
    Time(u64),
}

impl Since {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Since::Time(secs)
    }

    pub(crate) fn query_value(&self) -> String {
        match self {
            Since::Message(id) => id.clone(),
            Since::Time(secs) => secs.to_string(),
        }
    }
}

/// Result of one poll: the commands found, oldest first, and the id of the
/// newest message so the next poll can start after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollBatch {
    pub commands: Vec<InboundCommand>,
    pub last_id: Option<String>,
}

/// Parse a newline-delimited JSON poll body. Non-message events, malformed
/// lines and ordinary notices yield no command.
pub(crate) fn parse_poll_body(body: &str) -> PollBatch {
    let mut batch = PollBatch::default();
    let messages = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<InboundMessage>(line) {
            Ok(message) => Some(message),
            Err(err) => {
                debug!(error = %err, "skipping malformed ntfy line");
                None
            }
        })
        .filter(|message| message.event.as_deref().map_or(true, |event| event == "message"));

    for message in messages {
        if let Some(command) = message
            .message
            .as_deref()
            .and_then(|text| text.parse::<Command>().ok())
        {
            batch.commands.push(InboundCommand {
                id: message.id.clone(),
                command,
            });
        }
        batch.last_id = Some(message.id);
    }
    batch
}

/// Id of the message a publish created, when the server echoes it back.
pub(crate) fn published_id(body: &str) -> Option<String> {
    serde_json::from_str::<InboundMessage>(body.trim())
        .ok()
        .map(|message| message.id)
        .filter(|id| !id.is_empty())
}
