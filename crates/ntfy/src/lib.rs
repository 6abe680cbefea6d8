//! Client for an [ntfy](https://ntfy.sh)-compatible push server.
//!
//! Outbound, it publishes alert and acknowledgement notices whose action
//! buttons post a command word back to the same topic. Inbound, it polls
//! the topic for those command words.

mod client;
mod command;
mod error;
mod listener;
mod message;

pub use client::{NtfyClient, StatusReport};
pub use command::Command;
pub use error::NtfyError;
pub use listener::ListenerGuard;
pub use message::{Action, InboundCommand, PollBatch, Publish, Since};
