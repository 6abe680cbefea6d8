// # -----------------------------
// # crates/cli/src/main.rs
// # -----------------------------
use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod build_info;
mod commands;
mod control;
mod daemon;
mod stores;

use stores::Stores;

/// Overrides `--debug` with a full filter directive (same syntax as RUST_LOG).
const LOG_ENV: &str = "HOME_SENTRY_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "home-sentry",
    version,
    about = "Home Sentry - protect your laptop when your phone leaves"
)]
struct Cli {
    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,
    /// Settings file to use instead of the one in the runtime directory
    #[arg(long, global = true, env = "HOME_SENTRY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the presence monitor until interrupted
    Run {
        /// Log protective actions instead of performing them
        #[arg(long)]
        dry_run: bool,
    },
    /// List devices on the local network
    Scan,
    /// List visible wireless networks
    Wifi,
    /// Show settings and where this machine is
    Status,
    /// Set the trusted home network (defaults to the current one)
    SetHome { ssid: Option<String> },
    /// Choose the device whose presence keeps the machine safe
    SetDevice {
        /// Link-layer (MAC) address of the device
        mac: String,
        /// Last known IPv4 address (display only)
        #[arg(long)]
        ip: Option<String>,
        /// Friendly name (display only)
        #[arg(long)]
        name: Option<String>,
    },
    /// Stop monitoring any device
    ClearDevice,
    /// Pause protection
    Pause,
    /// Resume protection
    Resume,
    /// Seconds between escalation and the protective action
    SetDelay { seconds: u64 },
    /// What happens when the countdown expires (shutdown|hibernate|sleep|lock)
    SetAction { action: String },
    /// Set the confirmation PIN (4-8 digits); omit to clear it
    SetPin { pin: Option<String> },
    /// Turn PIN confirmation on or off for the stored PIN
    RequirePin {
        #[arg(action = clap::ArgAction::Set)]
        required: bool,
    },
    /// Push notifications and remote commands
    Ntfy {
        #[command(subcommand)]
        action: NtfyCommands,
    },
    /// Print version and build information
    Version,
}

#[derive(Subcommand, Debug)]
enum NtfyCommands {
    /// Enable notifications (generates a topic if none is set)
    Enable {
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        topic: Option<String>,
    },
    /// Disable notifications
    Disable,
    /// Send a test notification
    Test,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Commands::Version = cli.command {
        commands::version();
        return Ok(());
    }

    let stores = Stores::open(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { dry_run } => daemon::run(stores, dry_run).await,
        Commands::Scan => commands::scan(&stores).await,
        Commands::Wifi => commands::wifi().await,
        Commands::Status => commands::status(&stores).await,
        Commands::SetHome { ssid } => commands::set_home(&stores, ssid.as_deref()).await,
        Commands::SetDevice { mac, ip, name } => {
            commands::set_device(&stores, &mac, ip.as_deref(), name.as_deref())
        }
        Commands::ClearDevice => commands::clear_device(&stores),
        Commands::Pause => commands::set_paused(&stores, true),
        Commands::Resume => commands::set_paused(&stores, false),
        Commands::SetDelay { seconds } => commands::set_delay(&stores, seconds),
        Commands::SetAction { action } => commands::set_action(&stores, &action),
        Commands::SetPin { pin } => commands::set_pin(&stores, pin.as_deref()),
        Commands::RequirePin { required } => commands::require_pin(&stores, required),
        Commands::Ntfy { action } => match action {
            NtfyCommands::Enable { server, topic } => {
                commands::ntfy_enable(&stores, server.as_deref(), topic.as_deref())
            }
            NtfyCommands::Disable => commands::ntfy_disable(&stores),
            NtfyCommands::Test => commands::ntfy_test(&stores).await,
        },
        Commands::Version => Ok(()),
    }
}
