use std::fmt;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::ValidationError;
use crate::mac::MacAddress;
use crate::validate::{
    sanitize_display, sanitize_ipv4, sanitize_pin, sanitize_server, sanitize_ssid, sanitize_topic,
};

pub const DEFAULT_GRACE_CHECKS: u32 = 5;
pub const GRACE_CHECKS_RANGE: RangeInclusive<u32> = 1..=100;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const POLL_INTERVAL_RANGE: RangeInclusive<u64> = 1..=300;
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 500;
pub const PING_TIMEOUT_RANGE: RangeInclusive<u64> = 100..=5_000;
pub const DEFAULT_SHUTDOWN_DELAY_SECS: u64 = 10;
pub const SHUTDOWN_DELAY_RANGE: RangeInclusive<u64> = 5..=300;
pub const DEFAULT_NTFY_SERVER: &str = "https://ntfy.sh";

/// What happens to the machine when the countdown runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownAction {
    #[default]
    Shutdown,
    Hibernate,
    Sleep,
    Lock,
}

impl ShutdownAction {
    pub const ALL: [ShutdownAction; 4] = [
        ShutdownAction::Shutdown,
        ShutdownAction::Hibernate,
        ShutdownAction::Sleep,
        ShutdownAction::Lock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownAction::Shutdown => "shutdown",
            ShutdownAction::Hibernate => "hibernate",
            ShutdownAction::Sleep => "sleep",
            ShutdownAction::Lock => "lock",
        }
    }

    /// Capitalised form used in notifications ("Shutdown in 8 seconds").
    pub fn label(&self) -> &'static str {
        match self {
            ShutdownAction::Shutdown => "Shutdown",
            ShutdownAction::Hibernate => "Hibernate",
            ShutdownAction::Sleep => "Sleep",
            ShutdownAction::Lock => "Lock",
        }
    }
}

impl fmt::Display for ShutdownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShutdownAction {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| {
                ValidationError::new(
                    "shutdown_action",
                    format!(
                        "'{}' is not one of shutdown, hibernate, sleep, lock",
                        sanitize_display(raw)
                    ),
                )
            })
    }
}

/// Push-notification channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtfySettings {
    pub enabled: bool,
    pub server: String,
    pub topic: String,
}

impl Default for NtfySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            server: DEFAULT_NTFY_SERVER.to_string(),
            topic: String::new(),
        }
    }
}

impl NtfySettings {
    /// Enabled and with somewhere to publish.
    pub fn is_ready(&self) -> bool {
        self.enabled && !self.topic.is_empty()
    }
}

/// Validated runtime settings.
///
/// Every value here has already been through sanitisation; out-of-range
/// values found on disk are replaced with defaults when loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub home_ssid: String,
    pub device_mac: Option<MacAddress>,
    /// Last IP the device was seen at. Display only.
    pub device_ip: Option<Ipv4Addr>,
    /// Hostname of the device when it was selected. Display only.
    pub device_name: String,
    pub is_paused: bool,
    pub grace_checks: u32,
    pub poll_interval_secs: u64,
    pub ping_timeout_ms: u64,
    pub shutdown_delay_secs: u64,
    pub shutdown_action: ShutdownAction,
    pub require_pin: bool,
    pub shutdown_pin: String,
    pub ntfy: NtfySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home_ssid: String::new(),
            device_mac: None,
            device_ip: None,
            device_name: String::new(),
            is_paused: false,
            grace_checks: DEFAULT_GRACE_CHECKS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
            shutdown_delay_secs: DEFAULT_SHUTDOWN_DELAY_SECS,
            shutdown_action: ShutdownAction::default(),
            require_pin: false,
            shutdown_pin: String::new(),
            ntfy: NtfySettings::default(),
        }
    }
}

impl Settings {
    pub fn has_device_configured(&self) -> bool {
        self.device_mac.is_some()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_secs(self.shutdown_delay_secs)
    }

    /// How the monitored device is named in notices: its friendly name,
    /// else its MAC.
    pub fn device_label(&self) -> String {
        match (self.device_name.as_str(), self.device_mac) {
            ("", Some(mac)) => mac.to_string(),
            ("", None) => "not configured".to_string(),
            (name, _) => name.to_string(),
        }
    }

    /// A PIN gates the protective action only when one is actually stored.
    pub fn pin_required(&self) -> bool {
        self.require_pin && !self.shutdown_pin.is_empty()
    }

    /// Constant-time PIN check. Always true when no PIN is required.
    pub fn verify_pin(&self, candidate: &str) -> bool {
        if !self.pin_required() {
            return true;
        }
        let expected = self.shutdown_pin.as_bytes();
        let candidate = candidate.trim().as_bytes();
        expected.len() == candidate.len() && bool::from(expected.ct_eq(candidate))
    }
}

/// On-disk shape of `settings.toml`. Everything is loosely typed so a single
/// bad field can be reset instead of failing the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct SettingsFile {
    home_ssid: String,
    device_mac: String,
    device_ip: String,
    device_name: String,
    is_paused: bool,
    grace_checks: i64,
    poll_interval_secs: i64,
    ping_timeout_ms: i64,
    shutdown_delay_secs: i64,
    shutdown_action: String,
    require_pin: bool,
    shutdown_pin: String,
    ntfy: NtfyFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct NtfyFile {
    enabled: bool,
    server: String,
    topic: String,
}

impl Default for SettingsFile {
    fn default() -> Self {
        SettingsFile::from(&Settings::default())
    }
}

impl Default for NtfyFile {
    fn default() -> Self {
        let ntfy = NtfySettings::default();
        Self {
            enabled: ntfy.enabled,
            server: ntfy.server,
            topic: ntfy.topic,
        }
    }
}

impl From<&Settings> for SettingsFile {
    fn from(settings: &Settings) -> Self {
        Self {
            home_ssid: settings.home_ssid.clone(),
            device_mac: settings
                .device_mac
                .map(|mac| mac.to_string())
                .unwrap_or_default(),
            device_ip: settings
                .device_ip
                .map(|ip| ip.to_string())
                .unwrap_or_default(),
            device_name: settings.device_name.clone(),
            is_paused: settings.is_paused,
            grace_checks: i64::from(settings.grace_checks),
            poll_interval_secs: settings.poll_interval_secs as i64,
            ping_timeout_ms: settings.ping_timeout_ms as i64,
            shutdown_delay_secs: settings.shutdown_delay_secs as i64,
            shutdown_action: settings.shutdown_action.to_string(),
            require_pin: settings.require_pin,
            shutdown_pin: settings.shutdown_pin.clone(),
            ntfy: NtfyFile {
                enabled: settings.ntfy.enabled,
                server: settings.ntfy.server.clone(),
                topic: settings.ntfy.topic.clone(),
            },
        }
    }
}

fn in_range<T>(
    field: &'static str,
    value: i64,
    range: RangeInclusive<T>,
) -> Result<T, ValidationError>
where
    T: Copy + TryFrom<i64> + fmt::Display + PartialOrd,
{
    let (start, end) = (*range.start(), *range.end());
    T::try_from(value)
        .ok()
        .filter(|v| range.contains(v))
        .ok_or_else(|| {
            ValidationError::new(field, format!("{} is outside {}..={}", value, start, end))
        })
}

fn keep<T>(
    issues: &mut Vec<ValidationError>,
    result: Result<T, ValidationError>,
    fallback: T,
) -> T {
    result.unwrap_or_else(|err| {
        issues.push(err);
        fallback
    })
}

impl SettingsFile {
    /// Converts to validated settings, resetting each invalid field to its
    /// default. The returned errors describe what was reset.
    pub(crate) fn into_settings(self) -> (Settings, Vec<ValidationError>) {
        let defaults = Settings::default();
        let mut issues = Vec::new();

        let home_ssid = keep(
            &mut issues,
            sanitize_ssid(&self.home_ssid),
            defaults.home_ssid.clone(),
        );
        let device_mac = keep(
            &mut issues,
            match self.device_mac.trim() {
                "" => Ok(None),
                raw => raw.parse::<MacAddress>().map(Some),
            },
            None,
        );
        let device_ip = keep(
            &mut issues,
            sanitize_ipv4(&self.device_ip),
            None,
        );
        let grace_checks = keep(
            &mut issues,
            in_range("grace_checks", self.grace_checks, GRACE_CHECKS_RANGE),
            defaults.grace_checks,
        );
        let poll_interval_secs = keep(
            &mut issues,
            in_range("poll_interval_secs", self.poll_interval_secs, POLL_INTERVAL_RANGE),
            defaults.poll_interval_secs,
        );
        let ping_timeout_ms = keep(
            &mut issues,
            in_range("ping_timeout_ms", self.ping_timeout_ms, PING_TIMEOUT_RANGE),
            defaults.ping_timeout_ms,
        );
        let shutdown_delay_secs = keep(
            &mut issues,
            in_range("shutdown_delay_secs", self.shutdown_delay_secs, SHUTDOWN_DELAY_RANGE),
            defaults.shutdown_delay_secs,
        );
        let shutdown_action = keep(
            &mut issues,
            self.shutdown_action.parse::<ShutdownAction>(),
            defaults.shutdown_action,
        );
        let shutdown_pin = keep(
            &mut issues,
            sanitize_pin(&self.shutdown_pin),
            String::new(),
        );
        let server = keep(
            &mut issues,
            sanitize_server(&self.ntfy.server),
            defaults.ntfy.server.clone(),
        );
        let topic = keep(
            &mut issues,
            match self.ntfy.topic.trim() {
                "" => Ok(String::new()),
                raw => sanitize_topic(raw),
            },
            String::new(),
        );

        let require_pin = if self.require_pin && shutdown_pin.is_empty() {
            issues.push(ValidationError::new(
                "require_pin",
                "disabled because no valid PIN is stored",
            ));
            false
        } else {
            self.require_pin
        };

        let settings = Settings {
            home_ssid,
            device_mac,
            device_ip,
            device_name: sanitize_display(self.device_name.trim()),
            is_paused: self.is_paused,
            grace_checks,
            poll_interval_secs,
            ping_timeout_ms,
            shutdown_delay_secs,
            shutdown_action,
            require_pin,
            shutdown_pin,
            ntfy: NtfySettings {
                enabled: self.ntfy.enabled,
                server,
                topic,
            },
        };
        (settings, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> (Settings, Vec<ValidationError>) {
        toml::from_str::<SettingsFile>(toml_text)
            .expect("valid toml")
            .into_settings()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let (settings, issues) = parse("");
        assert_eq!(settings, Settings::default());
        assert!(issues.is_empty());
    }

    #[test]
    fn out_of_range_values_reset_individually() {
        let (settings, issues) = parse(
            r#"
            home_ssid = "HomeNet"
            device_mac = "AA:BB:CC:DD:EE:FF"
            grace_checks = 0
            poll_interval_secs = 301
            ping_timeout_ms = 50
            shutdown_delay_secs = 4
            shutdown_action = "reboot"
            "#,
        );
        assert_eq!(settings.home_ssid, "HomeNet");
        assert_eq!(settings.device_mac.unwrap().to_string(), "aa-bb-cc-dd-ee-ff");
        assert_eq!(settings.grace_checks, DEFAULT_GRACE_CHECKS);
        assert_eq!(settings.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(settings.ping_timeout_ms, DEFAULT_PING_TIMEOUT_MS);
        assert_eq!(settings.shutdown_delay_secs, DEFAULT_SHUTDOWN_DELAY_SECS);
        assert_eq!(settings.shutdown_action, ShutdownAction::Shutdown);
        let fields: Vec<_> = issues.iter().map(|issue| issue.field).collect();
        assert_eq!(
            fields,
            [
                "grace_checks",
                "poll_interval_secs",
                "ping_timeout_ms",
                "shutdown_delay_secs",
                "shutdown_action"
            ]
        );
    }

    #[test]
    fn boundary_values_are_kept() {
        let (settings, issues) = parse(
            r#"
            grace_checks = 100
            poll_interval_secs = 1
            shutdown_delay_secs = 300
            shutdown_action = "LOCK"
            "#,
        );
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(settings.grace_checks, 100);
        assert_eq!(settings.poll_interval_secs, 1);
        assert_eq!(settings.shutdown_delay_secs, 300);
        assert_eq!(settings.shutdown_action, ShutdownAction::Lock);
    }

    #[test]
    fn invalid_pin_also_disables_the_requirement() {
        let (settings, issues) = parse(
            r#"
            require_pin = true
            shutdown_pin = "12"
            "#,
        );
        assert!(!settings.require_pin);
        assert!(settings.shutdown_pin.is_empty());
        assert!(!settings.pin_required());
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn invalid_mac_clears_the_device() {
        let (settings, issues) = parse(r#"device_mac = "not-a-mac""#);
        assert!(!settings.has_device_configured());
        assert_eq!(issues[0].field, "device_mac");
    }

    #[test]
    fn pin_verification() {
        let mut settings = Settings::default();
        assert!(settings.verify_pin("anything"));

        settings.require_pin = true;
        settings.shutdown_pin = "4821".into();
        assert!(settings.verify_pin("4821"));
        assert!(settings.verify_pin(" 4821\n"));
        assert!(!settings.verify_pin("4820"));
        assert!(!settings.verify_pin("48210"));
        assert!(!settings.verify_pin(""));
    }

    #[test]
    fn written_form_reloads_unchanged() {
        let mut settings = Settings::default();
        settings.home_ssid = "HomeNet".into();
        settings.device_mac = Some("a4:83:e7:12:34:56".parse().unwrap());
        settings.device_ip = Some(Ipv4Addr::new(192, 168, 1, 42));
        settings.shutdown_action = ShutdownAction::Hibernate;
        settings.ntfy.enabled = true;
        settings.ntfy.topic = "home-sentry-123456".into();

        let text = toml::to_string_pretty(&SettingsFile::from(&settings)).unwrap();
        let (reloaded, issues) = parse(&text);
        assert!(issues.is_empty());
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn device_label_prefers_the_friendly_name() {
        let mut settings = Settings::default();
        assert_eq!(settings.device_label(), "not configured");

        let mac = MacAddress::new([0xa4, 0x83, 0xe7, 0x12, 0x34, 0x56]);
        settings.device_mac = Some(mac);
        assert_eq!(settings.device_label(), "a4-83-e7-12-34-56");

        settings.device_name = "pixel".to_string();
        assert_eq!(settings.device_label(), "pixel");
    }
}
