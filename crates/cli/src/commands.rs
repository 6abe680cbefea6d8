//! One-shot subcommands: configuration edits and network inspection.

use anyhow::{bail, Context, Result};
use home_sentry_common::validate::sanitize_ipv4;
use home_sentry_common::{MacAddress, Settings, ShutdownAction};
use home_sentry_monitor::{NetworkName, PresenceCheck, PresenceDetector, SystemProbe};
use home_sentry_ntfy::NtfyClient;
use tracing::info;

use crate::build_info;
use crate::stores::Stores;

pub fn version() {
    println!("{}", build_info::banner());
    println!("built {} from {}", build_info::BUILT_AT, build_info::REVISION);
}

fn detector() -> PresenceDetector<SystemProbe> {
    PresenceDetector::new(SystemProbe::default())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn device_summary(settings: &Settings) -> String {
    let Some(mac) = settings.device_mac else {
        return "(not set)".to_string();
    };
    let mut summary = mac.to_string();
    if !settings.device_name.is_empty() {
        summary.push_str(&format!(" ({})", settings.device_name));
    }
    if let Some(ip) = settings.device_ip {
        summary.push_str(&format!(" last seen at {ip}"));
    }
    summary
}

pub async fn status(stores: &Stores) -> Result<()> {
    let settings = stores.settings.load()?;
    let network = detector().current_network_name().await;
    let location = if network.matches_home(&settings.home_ssid) {
        "at home"
    } else {
        "roaming"
    };

    println!("Settings:        {}", stores.settings.path().display());
    println!("State:           {}", stores.state.path().display());
    println!("Home network:    {}", or_unset(&settings.home_ssid));
    println!("Current network: {network} ({location})");
    println!("Device:          {}", device_summary(&settings));
    println!("Paused:          {}", if settings.is_paused { "yes" } else { "no" });
    println!(
        "Escalation:      {} missed checks, every {}s, ping timeout {}ms",
        settings.grace_checks, settings.poll_interval_secs, settings.ping_timeout_ms
    );
    println!(
        "Action:          {} after {}s",
        settings.shutdown_action.label(),
        settings.shutdown_delay_secs
    );
    println!(
        "PIN:             {}",
        if settings.pin_required() {
            "required"
        } else if settings.shutdown_pin.is_empty() {
            "not set"
        } else {
            "set, not required"
        }
    );
    if settings.ntfy.is_ready() {
        println!(
            "Notifications:   on ({}/{})",
            settings.ntfy.server, settings.ntfy.topic
        );
    } else {
        println!("Notifications:   {}", on_off(settings.ntfy.enabled));
    }
    if let Ok(seen) = stores.state.load() {
        println!(
            "Phone seen yet:  {}",
            if seen.phone_ever_seen { "yes" } else { "no" }
        );
    }
    Ok(())
}

pub async fn scan(stores: &Stores) -> Result<()> {
    let settings = stores.settings.load()?;
    let devices = detector()
        .scan_devices(settings.ping_timeout())
        .await
        .context("network scan failed")?;
    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("  {:<15}  {:<17}  HOSTNAME", "IP", "MAC");
    for device in devices {
        let marker = if settings.device_mac == Some(device.mac) {
            '*'
        } else {
            ' '
        };
        println!(
            "{marker} {:<15}  {:<17}  {}",
            device.ip.to_string(),
            device.mac.to_string(),
            device.hostname
        );
    }
    Ok(())
}

pub async fn wifi() -> Result<()> {
    let networks = detector()
        .visible_networks()
        .await
        .context("cannot list wireless networks")?;
    if networks.is_empty() {
        println!("No networks visible.");
    }
    for name in networks {
        println!("{name}");
    }
    Ok(())
}

pub async fn set_home(stores: &Stores, ssid: Option<&str>) -> Result<()> {
    let ssid = match ssid {
        Some(ssid) => ssid.to_string(),
        None => match detector().current_network_name().await {
            NetworkName::Connected(name) => name,
            NetworkName::Unknown => {
                bail!("not connected to a wireless network; pass the SSID explicitly")
            }
        },
    };
    let settings = stores.settings.set_home_ssid(&ssid)?;
    info!(ssid = %settings.home_ssid, "home network saved");
    println!("Home network set to {}", or_unset(&settings.home_ssid));
    Ok(())
}

pub fn set_device(
    stores: &Stores,
    mac: &str,
    ip: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let mac: MacAddress = mac.parse()?;
    let ip = match ip {
        Some(ip) => sanitize_ipv4(ip)?,
        None => None,
    };
    let settings = stores.settings.set_device(mac, ip, name)?;
    println!("Monitoring {}", device_summary(&settings));
    Ok(())
}

pub fn clear_device(stores: &Stores) -> Result<()> {
    stores.settings.clear_device()?;
    println!("Device cleared; monitoring is off until a device is set.");
    Ok(())
}

pub fn set_paused(stores: &Stores, paused: bool) -> Result<()> {
    stores.settings.set_paused(paused)?;
    println!("Protection {}", if paused { "paused" } else { "resumed" });
    Ok(())
}

pub fn set_delay(stores: &Stores, seconds: u64) -> Result<()> {
    let settings = stores.settings.set_shutdown_delay(seconds)?;
    println!("Shutdown delay set to {}s", settings.shutdown_delay_secs);
    Ok(())
}

pub fn set_action(stores: &Stores, action: &str) -> Result<()> {
    let action: ShutdownAction = action.parse()?;
    let settings = stores.settings.set_shutdown_action(action)?;
    println!("Protective action set to {}", settings.shutdown_action.label());
    Ok(())
}

pub fn set_pin(stores: &Stores, pin: Option<&str>) -> Result<()> {
    let settings = stores.settings.set_pin(pin.unwrap_or_default())?;
    if settings.pin_required() {
        println!("PIN saved; it is now required before the protective action runs.");
    } else {
        println!("PIN cleared.");
    }
    Ok(())
}

pub fn require_pin(stores: &Stores, required: bool) -> Result<()> {
    stores.settings.set_require_pin(required)?;
    println!("PIN confirmation {}", on_off(required));
    Ok(())
}

pub fn ntfy_enable(stores: &Stores, server: Option<&str>, topic: Option<&str>) -> Result<()> {
    let settings = stores.settings.set_ntfy(true, server, topic)?;
    println!("Notifications enabled.");
    println!("Subscribe to {}/{}", settings.ntfy.server, settings.ntfy.topic);
    Ok(())
}

pub fn ntfy_disable(stores: &Stores) -> Result<()> {
    stores.settings.set_ntfy(false, None, None)?;
    println!("Notifications disabled.");
    Ok(())
}

pub async fn ntfy_test(stores: &Stores) -> Result<()> {
    let settings = stores.settings.load()?;
    if !settings.ntfy.is_ready() {
        bail!("notifications are not enabled; run `home-sentry ntfy enable` first");
    }
    let client = NtfyClient::new(&settings.ntfy.server, &settings.ntfy.topic)?;
    client
        .send_test_notice()
        .await
        .with_context(|| format!("could not reach {}", client.topic_url()))?;
    println!("Test notification sent to {}", client.topic_url());
    Ok(())
}
