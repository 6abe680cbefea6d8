//! The protective action, audible alert and desktop notification.

use std::time::Duration;

use async_trait::async_trait;
use home_sentry_common::ShutdownAction;
use tracing::{info, warn};

use crate::error::ActionError;
use crate::probe::command;

const ACTION_TIMEOUT: Duration = Duration::from_secs(15);
const SIDE_EFFECT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the Windows balloon stays up before its icon is disposed.
#[cfg(any(target_os = "windows", test))]
const BALLOON_SECS: u64 = 10;
/// Outlives the balloon so the script always reaches `Dispose()`.
#[cfg(any(target_os = "windows", test))]
const BALLOON_TIMEOUT: Duration = Duration::from_secs(BALLOON_SECS + 5);

#[async_trait]
pub trait HostActions: Send + Sync {
    /// Carry out the protective action. Errors are for logging only.
    async fn perform(&self, action: ShutdownAction) -> Result<(), ActionError>;

    /// Short audible alert. Fire-and-forget.
    fn alert(&self);

    /// Desktop notification. Fire-and-forget.
    fn notify(&self, title: &str, body: &str);
}

/// [`HostActions`] that really shuts down, suspends or locks the machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemActions;

/// [`HostActions`] that only logs what would have happened.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActions;

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

#[cfg(target_os = "windows")]
fn action_command(action: ShutdownAction) -> Result<(&'static str, Vec<String>), ActionError> {
    Ok(match action {
        ShutdownAction::Shutdown => ("shutdown", owned(&["/s", "/t", "0"])),
        ShutdownAction::Hibernate => ("shutdown", owned(&["/h"])),
        ShutdownAction::Sleep => (
            "rundll32.exe",
            owned(&["powrprof.dll,SetSuspendState", "0,1,0"]),
        ),
        ShutdownAction::Lock => ("rundll32.exe", owned(&["user32.dll,LockWorkStation"])),
    })
}

#[cfg(target_os = "linux")]
fn action_command(action: ShutdownAction) -> Result<(&'static str, Vec<String>), ActionError> {
    Ok(match action {
        ShutdownAction::Shutdown => ("systemctl", owned(&["poweroff"])),
        ShutdownAction::Hibernate => ("systemctl", owned(&["hibernate"])),
        ShutdownAction::Sleep => ("systemctl", owned(&["suspend"])),
        ShutdownAction::Lock => ("loginctl", owned(&["lock-session"])),
    })
}

#[cfg(target_os = "macos")]
fn action_command(action: ShutdownAction) -> Result<(&'static str, Vec<String>), ActionError> {
    Ok(match action {
        ShutdownAction::Shutdown => (
            "osascript",
            owned(&["-e", "tell app \"System Events\" to shut down"]),
        ),
        // Hibernation needs a system-wide pmset change; sleep instead.
        ShutdownAction::Hibernate | ShutdownAction::Sleep => ("pmset", owned(&["sleepnow"])),
        ShutdownAction::Lock => ("pmset", owned(&["displaysleepnow"])),
    })
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
fn action_command(action: ShutdownAction) -> Result<(&'static str, Vec<String>), ActionError> {
    Err(ActionError::Unsupported(action.as_str()))
}

/// Quote for a single-quoted PowerShell string.
#[cfg(any(target_os = "windows", test))]
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Balloon notification that removes its tray icon once shown.
#[cfg(any(target_os = "windows", test))]
fn balloon_script(title: &str, body: &str) -> String {
    format!(
        "Add-Type -AssemblyName System.Windows.Forms; \
         $n = New-Object System.Windows.Forms.NotifyIcon; \
         $n.Icon = [System.Drawing.SystemIcons]::Warning; \
         $n.Visible = $true; \
         $n.ShowBalloonTip({}, {}, {}, 'Warning'); \
         Start-Sleep -Seconds {}; $n.Dispose()",
        BALLOON_SECS * 1000,
        ps_quote(title),
        ps_quote(body),
        BALLOON_SECS
    )
}

/// Quote for an AppleScript string literal.
#[cfg(target_os = "macos")]
fn applescript_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[async_trait]
impl HostActions for SystemActions {
    async fn perform(&self, action: ShutdownAction) -> Result<(), ActionError> {
        let (program, args) = action_command(action)?;
        info!(%action, program, "executing protective action");
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        command::stdout_of(program, &borrowed, ACTION_TIMEOUT).await?;
        Ok(())
    }

    fn alert(&self) {
        #[cfg(target_os = "windows")]
        command::spawn_detached(
            "powershell",
            owned(&["-NoProfile", "-Command", "[console]::beep(1000,300)"]),
            SIDE_EFFECT_TIMEOUT,
        );
        #[cfg(target_os = "macos")]
        command::spawn_detached("osascript", owned(&["-e", "beep"]), SIDE_EFFECT_TIMEOUT);
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            use std::io::Write;
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(b"\x07");
            let _ = stderr.flush();
        }
    }

    fn notify(&self, title: &str, body: &str) {
        #[cfg(target_os = "windows")]
        command::spawn_detached(
            "powershell",
            vec![
                "-NoProfile".into(),
                "-Command".into(),
                balloon_script(title, body),
            ],
            BALLOON_TIMEOUT,
        );
        #[cfg(target_os = "macos")]
        {
            let script = format!(
                "display notification {} with title {}",
                applescript_quote(body),
                applescript_quote(title)
            );
            command::spawn_detached("osascript", vec!["-e".into(), script], SIDE_EFFECT_TIMEOUT);
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        command::spawn_detached(
            "notify-send",
            vec![
                "--urgency=critical".into(),
                "--app-name=Home Sentry".into(),
                title.to_string(),
                body.to_string(),
            ],
            SIDE_EFFECT_TIMEOUT,
        );
    }
}

#[async_trait]
impl HostActions for DryRunActions {
    async fn perform(&self, action: ShutdownAction) -> Result<(), ActionError> {
        warn!(%action, "dry run: protective action skipped");
        Ok(())
    }

    fn alert(&self) {
        info!("dry run: alert");
    }

    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "dry run: notification");
    }
}
