//! `home-sentry run`: the monitor plus its local and remote control inputs.

use std::sync::Arc;

use anyhow::Result;
use home_sentry_common::{FileSettingsStore, Settings};
use home_sentry_monitor::{
    DryRunActions, HostActions, Monitor, MonitorContext, NtfyConnector, PinOutcome,
    PresenceCheck, PresenceDetector, SentryStatus, SystemActions, SystemProbe,
};
use home_sentry_ntfy::{Command, ListenerGuard, NtfyClient, Since, StatusReport};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::build_info;
use crate::control::{ControlCommand, UnknownCommand, HELP};
use crate::stores::Stores;

pub async fn run(stores: Stores, dry_run: bool) -> Result<()> {
    let settings_store = Arc::new(stores.settings);
    let presence = Arc::new(PresenceDetector::new(SystemProbe::default()));
    let actions: Arc<dyn HostActions> = if dry_run {
        info!("dry run: protective actions will only be logged");
        Arc::new(DryRunActions)
    } else {
        Arc::new(SystemActions)
    };

    let monitor = Arc::new(Monitor::new(MonitorContext {
        settings: settings_store.clone(),
        presence: presence.clone(),
        state_store: Arc::new(stores.state),
        actions,
        remote: Arc::new(NtfyConnector),
    }));
    monitor.set_status_observer(Arc::new(|status: SentryStatus| {
        info!(%status, "status changed");
    }));

    let settings = match settings_store.load() {
        Ok(settings) => settings,
        Err(err) => {
            warn!(
                error = %format!("{err:#}"),
                "settings unreadable; starting with defaults until they load"
            );
            Settings::default()
        }
    };
    info!(
        build = build_info::BUILD_ID,
        settings = %settings_store.path().display(),
        home = %settings.home_ssid,
        device = %settings.device_label(),
        action = %settings.shutdown_action,
        "home sentry starting"
    );
    let _commands = spawn_remote_commands(&settings, &settings_store, &monitor, &presence);
    spawn_control_reader(Arc::clone(&monitor), Arc::clone(&presence));

    tokio::select! {
        _ = monitor.start() => {}
        _ = shutdown_requested() => {}
    }
    if monitor.is_shutdown_pending() {
        monitor.cancel_shutdown();
    }
    info!("home sentry stopped");
    Ok(())
}

async fn shutdown_requested() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("received Ctrl+C; shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM; shutting down"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    }
    if signal::ctrl_c().await.is_ok() {
        info!("received Ctrl+C; shutting down");
    }
}

async fn status_report(
    monitor: &Monitor,
    presence: &PresenceDetector<SystemProbe>,
    settings: &Settings,
) -> StatusReport {
    StatusReport {
        status: monitor.status().label().to_string(),
        network: presence.current_network_name().await.to_string(),
        device: settings.device_label(),
        paused: monitor.paused_override().unwrap_or(settings.is_paused),
    }
}

/// Always-on pause/resume/status listener on the ntfy topic. Cancel words
/// are left to the countdown's own listener.
fn spawn_remote_commands(
    settings: &Settings,
    store: &Arc<FileSettingsStore>,
    monitor: &Arc<Monitor>,
    presence: &Arc<PresenceDetector<SystemProbe>>,
) -> Option<ListenerGuard> {
    if !settings.ntfy.is_ready() {
        debug!("ntfy disabled; remote commands unavailable");
        return None;
    }
    let client = match NtfyClient::new(&settings.ntfy.server, &settings.ntfy.topic) {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "ntfy misconfigured; remote commands unavailable");
            return None;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let guard = client.spawn_command_listener(Since::now(), move |command| {
        let _ = tx.send(command);
    });

    let store = Arc::clone(store);
    let monitor = Arc::clone(monitor);
    let presence = Arc::clone(presence);
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            let handled = handle_remote(command, &client, &store, &monitor, &presence).await;
            if let Err(err) = handled {
                warn!(%command, error = %format!("{err:#}"), "remote command failed");
            }
        }
    });
    Some(guard)
}

async fn handle_remote(
    command: Command,
    client: &NtfyClient,
    store: &FileSettingsStore,
    monitor: &Monitor,
    presence: &PresenceDetector<SystemProbe>,
) -> Result<()> {
    match command {
        Command::Pause => {
            monitor.pause();
            client.send_paused_ack().await?;
        }
        Command::Resume => {
            monitor.resume();
            client.send_resumed_ack().await?;
        }
        Command::Status => {
            let settings = store.load()?;
            let report = status_report(monitor, presence, &settings).await;
            client.send_status_notice(&report).await?;
        }
        Command::CancelAndPause | Command::CancelOnly => {}
    }
    Ok(())
}

/// Local stand-in for a tray menu: one command per stdin line.
fn spawn_control_reader(monitor: Arc<Monitor>, presence: Arc<PresenceDetector<SystemProbe>>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("stdin closed; local control disabled");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "stdin read failed; local control disabled");
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ControlCommand>() {
                Ok(command) => handle_local(command, &monitor, &presence).await,
                Err(UnknownCommand(text)) => println!("unknown command '{text}'; {HELP}"),
            }
        }
    });
}

async fn handle_local(
    command: ControlCommand,
    monitor: &Monitor,
    presence: &PresenceDetector<SystemProbe>,
) {
    match command {
        ControlCommand::Cancel => {
            if monitor.cancel_shutdown() {
                println!("Shutdown cancelled.");
            } else {
                println!("No shutdown pending.");
            }
        }
        ControlCommand::Pause => {
            monitor.pause();
            println!("Protection paused.");
        }
        ControlCommand::Resume => {
            monitor.resume();
            println!("Protection resumed.");
        }
        ControlCommand::Status => {
            let snapshot = monitor.snapshot();
            let network = presence.current_network_name().await;
            println!(
                "{} on {} (missed checks: {}, shutdown pending: {})",
                snapshot.status,
                network,
                snapshot.grace_count,
                if snapshot.shutdown_pending { "yes" } else { "no" }
            );
        }
        ControlCommand::Pin(pin) => match monitor.submit_pin(&pin) {
            PinOutcome::Accepted => println!("PIN accepted."),
            PinOutcome::Rejected => println!("Wrong PIN."),
            PinOutcome::NotAwaiting => println!("No PIN requested right now."),
        },
    }
}
