use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::CommandError;

/// Keeps helper processes from flashing a console window on Windows.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Run `program` to completion, killing it if `limit` elapses first.
pub(crate) async fn run(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<Output, CommandError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(windows)]
    command.creation_flags(CREATE_NO_WINDOW);

    debug!(program, ?args, "running command");
    match timeout(limit, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(CommandError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(CommandError::Timeout {
            program: program.to_string(),
            timeout: limit,
        }),
    }
}

/// Run `program` and return its stdout, treating a non-zero exit as an error.
pub(crate) async fn stdout_of(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<String, CommandError> {
    let output = run(program, args, limit).await?;
    if !output.status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run `program` in the background; failures are only logged.
pub(crate) fn spawn_detached(program: &'static str, args: Vec<String>, limit: Duration) {
    tokio::spawn(async move {
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        if let Err(err) = stdout_of(program, &borrowed, limit).await {
            debug!(program, error = %err, "background command failed");
        }
    });
}
