//! Line commands read from stdin while the daemon runs.

use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Cancel,
    Pause,
    Resume,
    Status,
    Pin(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl FromStr for ControlCommand {
    type Err = UnknownCommand;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();
        if words.next().is_some() {
            return Err(UnknownCommand(line.trim().to_string()));
        }

        match (verb.as_str(), argument) {
            ("cancel", None) => Ok(ControlCommand::Cancel),
            ("pause", None) => Ok(ControlCommand::Pause),
            ("resume", None) => Ok(ControlCommand::Resume),
            ("status", None) => Ok(ControlCommand::Status),
            ("pin", Some(pin)) if pin.chars().all(|c| c.is_ascii_digit()) => {
                Ok(ControlCommand::Pin(pin.to_string()))
            }
            _ => Err(UnknownCommand(line.trim().to_string())),
        }
    }
}

pub const HELP: &str = "commands: cancel | pause | resume | status | pin <digits>";
