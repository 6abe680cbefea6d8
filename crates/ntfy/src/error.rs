use thiserror::Error;

#[derive(Debug, Error)]
pub enum NtfyError {
    /// Server URL or topic unusable.
    #[error("invalid ntfy configuration: {0}")]
    Config(String),

    /// Connection, timeout or body decoding failure.
    #[error("ntfy request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("ntfy returned status {code}: {body}")]
    Status { code: u16, body: String },
}
