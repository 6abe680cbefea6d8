use std::collections::VecDeque;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::client::NtfyClient;
use crate::command::Command;
use crate::message::{InboundCommand, PollBatch, Since};

const CANCEL_POLL_PERIOD: Duration = Duration::from_secs(1);
const COMMAND_POLL_PERIOD: Duration = Duration::from_secs(2);
const SEEN_CAPACITY: usize = 64;

/// Keeps a background poller alive; dropping it stops the poller.
#[derive(Debug)]
pub struct ListenerGuard {
    handle: JoinHandle<()>,
}

impl ListenerGuard {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Bounded memory of message ids already handled.
#[derive(Debug, Default)]
struct SeenIds {
    ids: VecDeque<String>,
}

impl SeenIds {
    /// Returns true the first time `id` is offered.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.iter().any(|seen| seen == id) {
            return false;
        }
        if self.ids.len() == SEEN_CAPACITY {
            self.ids.pop_front();
        }
        self.ids.push_back(id.to_string());
        true
    }

    fn fresh(&mut self, commands: Vec<InboundCommand>) -> Vec<Command> {
        commands
            .into_iter()
            .filter(|inbound| self.insert(&inbound.id))
            .map(|inbound| inbound.command)
            .collect()
    }
}

/// Poll position for one listener: advances past every message read so a
/// command is fetched once, and never looks before where it started.
#[derive(Debug)]
struct Cursor {
    since: Since,
    seen: SeenIds,
}

impl Cursor {
    fn new(since: Since) -> Self {
        Self {
            since,
            seen: SeenIds::default(),
        }
    }

    fn advance(&mut self, batch: PollBatch) -> Vec<Command> {
        if let Some(last) = batch.last_id {
            self.since = Since::Message(last);
        }
        self.seen.fresh(batch.commands)
    }
}

impl NtfyClient {
    /// Poll every second for `cancel_pause` / `cancel_only` published after
    /// `since` and hand the first one to `on_cancel`, then stop.
    pub fn spawn_cancel_listener<F>(&self, since: Since, on_cancel: F) -> ListenerGuard
    where
        F: FnOnce(Command) + Send + 'static,
    {
        let client = self.clone();
        let handle = tokio::spawn(async move {
            let mut cursor = Cursor::new(since);
            let mut ticker = interval(CANCEL_POLL_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(topic = %client.topic(), "shutdown cancel listener started");

            loop {
                ticker.tick().await;
                let commands = match client.poll_commands(&cursor.since).await {
                    Ok(batch) => cursor.advance(batch),
                    Err(err) => {
                        debug!(error = %err, "cancel poll failed");
                        continue;
                    }
                };
                if let Some(command) = commands.into_iter().rev().find(Command::is_cancel) {
                    info!(%command, "received remote shutdown cancel");
                    on_cancel(command);
                    return;
                }
            }
        });
        ListenerGuard { handle }
    }

    /// Poll every two seconds and call `handler` once per command published
    /// after `since`.
    pub fn spawn_command_listener<F>(&self, since: Since, mut handler: F) -> ListenerGuard
    where
        F: FnMut(Command) + Send + 'static,
    {
        let client = self.clone();
        let handle = tokio::spawn(async move {
            let mut cursor = Cursor::new(since);
            let mut ticker = interval(COMMAND_POLL_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(topic = %client.topic(), "command listener started");

            loop {
                ticker.tick().await;
                match client.poll_commands(&cursor.since).await {
                    Ok(batch) => {
                        for command in cursor.advance(batch) {
                            info!(%command, "received ntfy command");
                            handler(command);
                        }
                    }
                    Err(err) => debug!(error = %err, "command poll failed"),
                }
            }
        });
        ListenerGuard { handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(id: &str, command: Command) -> InboundCommand {
        InboundCommand {
            id: id.to_string(),
            command,
        }
    }

    #[test]
    fn repeated_ids_are_delivered_once() {
        let mut seen = SeenIds::default();
        let first = seen.fresh(vec![
            inbound("a", Command::Pause),
            inbound("b", Command::Status),
        ]);
        assert_eq!(first, [Command::Pause, Command::Status]);

        let second = seen.fresh(vec![
            inbound("a", Command::Pause),
            inbound("b", Command::Status),
            inbound("c", Command::Resume),
        ]);
        assert_eq!(second, [Command::Resume]);
    }

    #[test]
    fn cursor_moves_past_the_newest_message() {
        let mut cursor = Cursor::new(Since::Time(1_700_000_000));
        let commands = cursor.advance(PollBatch {
            commands: vec![inbound("m1", Command::CancelOnly)],
            last_id: Some("m2".into()),
        });
        assert_eq!(commands, [Command::CancelOnly]);
        assert_eq!(cursor.since, Since::Message("m2".into()));

        let again = cursor.advance(PollBatch {
            commands: vec![inbound("m1", Command::CancelOnly)],
            last_id: None,
        });
        assert!(again.is_empty());
        assert_eq!(cursor.since, Since::Message("m2".into()));
    }

    #[test]
    fn memory_is_bounded() {
        let mut seen = SeenIds::default();
        for n in 0..SEEN_CAPACITY + 10 {
            assert!(seen.insert(&format!("id-{n}")));
        }
        assert_eq!(seen.ids.len(), SEEN_CAPACITY);
        assert!(seen.insert("id-0"));
        assert!(!seen.insert(&format!("id-{}", SEEN_CAPACITY + 9)));
    }

    #[tokio::test]
    async fn dropping_the_guard_stops_the_poller() {
        let client = NtfyClient::new("http://127.0.0.1:9", "unit-test").unwrap();
        let guard = client.spawn_command_listener(Since::now(), |_| {});
        assert!(!guard.is_finished());
        let abort_handle = guard.handle.abort_handle();
        drop(guard);
        tokio::task::yield_now().await;
        for _ in 0..100 {
            if abort_handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(abort_handle.is_finished());
    }
}
