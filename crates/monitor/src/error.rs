use std::io;
use std::time::Duration;

use thiserror::Error;

/// Running an external OS command failed.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// A network query could not be answered.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// No local IPv4 address could be determined.
    #[error("no IPv4 route available: {0}")]
    NoRoute(#[source] io::Error),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// The protective action could not be carried out.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}
