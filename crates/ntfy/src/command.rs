use std::fmt;
use std::str::FromStr;

/// Command words a phone can post to the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Abort the running countdown and pause protection.
    CancelAndPause,
    /// Abort the running countdown and keep monitoring.
    CancelOnly,
    Pause,
    Resume,
    Status,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::CancelAndPause => "cancel_pause",
            Command::CancelOnly => "cancel_only",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Status => "status",
        }
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, Command::CancelAndPause | Command::CancelOnly)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ();

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cancel_pause" => Ok(Command::CancelAndPause),
            "cancel_only" => Ok(Command::CancelOnly),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "status" => Ok(Command::Status),
            _ => Err(()),
        }
    }
}
