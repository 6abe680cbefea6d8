//! Input sanitisation for everything that ends up in `settings.toml` or in
//! a log line: values typed by the user, read from the OS or returned by a
//! reverse DNS lookup.

use std::net::Ipv4Addr;

use crate::error::ValidationError;

pub const MAX_SSID_LEN: usize = 32;
pub const MIN_PIN_LEN: usize = 4;
pub const MAX_PIN_LEN: usize = 8;
pub const MAX_TOPIC_LEN: usize = 64;
pub const MAX_HOSTNAME_LEN: usize = 253;
pub const MAX_DISPLAY_LEN: usize = 128;

/// Placeholder for hosts whose name could not be resolved.
pub const UNKNOWN_HOST: &str = "Unknown";

const DANGEROUS_CHARS: [char; 5] = ['<', '>', '"', '\'', '&'];
const DANGEROUS_SCHEMES: [&str; 3] = ["javascript:", "data:", "vbscript:"];

fn contains_dangerous(value: &str) -> bool {
    if value.contains(DANGEROUS_CHARS) {
        return true;
    }
    let lowered = value.to_ascii_lowercase();
    DANGEROUS_SCHEMES
        .iter()
        .any(|scheme| lowered.contains(scheme))
}

fn strip_dangerous(value: &str) -> String {
    let mut cleaned: String = value.chars().filter(|c| !DANGEROUS_CHARS.contains(c)).collect();
    for scheme in DANGEROUS_SCHEMES {
        while let Some(start) = cleaned.to_ascii_lowercase().find(scheme) {
            cleaned.replace_range(start..start + scheme.len(), "");
        }
    }
    cleaned
}

fn truncate_chars(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Removes control characters, keeping tabs and newlines.
pub fn remove_control_chars(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Validates a wireless network name. Empty means "no home network".
pub fn sanitize_ssid(raw: &str) -> Result<String, ValidationError> {
    let ssid = raw.trim();
    if ssid.is_empty() {
        return Ok(String::new());
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(ValidationError::new(
            "home_ssid",
            format!("SSID must be {} bytes or less", MAX_SSID_LEN),
        ));
    }
    if ssid.chars().any(char::is_control) || contains_dangerous(ssid) {
        return Err(ValidationError::new(
            "home_ssid",
            "SSID contains characters that are not allowed",
        ));
    }
    Ok(ssid.to_string())
}

/// Validates a dotted-quad IPv4 address. Empty means "not known".
pub fn sanitize_ipv4(raw: &str) -> Result<Option<Ipv4Addr>, ValidationError> {
    let ip = raw.trim();
    if ip.is_empty() {
        return Ok(None);
    }
    ip.parse::<Ipv4Addr>().map(Some).map_err(|_| {
        ValidationError::new("device_ip", "IP must be in the form xxx.xxx.xxx.xxx")
    })
}

/// Validates a confirmation PIN. Empty means "no PIN".
pub fn sanitize_pin(raw: &str) -> Result<String, ValidationError> {
    let pin = raw.trim();
    if pin.is_empty() {
        return Ok(String::new());
    }
    let valid_len = (MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len());
    if !valid_len || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::new(
            "shutdown_pin",
            format!("PIN must be {}-{} digits", MIN_PIN_LEN, MAX_PIN_LEN),
        ));
    }
    Ok(pin.to_string())
}

/// Validates a push-notification topic name.
pub fn sanitize_topic(raw: &str) -> Result<String, ValidationError> {
    let topic = raw.trim();
    let valid_chars = topic
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if topic.is_empty() || topic.len() > MAX_TOPIC_LEN || !valid_chars {
        return Err(ValidationError::new(
            "ntfy.topic",
            format!(
                "topic must be 1-{} characters of letters, digits, '-' or '_'",
                MAX_TOPIC_LEN
            ),
        ));
    }
    Ok(topic.to_string())
}

/// Validates a push-notification server URL and strips trailing slashes.
pub fn sanitize_server(raw: &str) -> Result<String, ValidationError> {
    let server = raw.trim().trim_end_matches('/');
    let host = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"));
    match host {
        Some(host) if !host.is_empty() && !host.contains(char::is_whitespace) => {
            Ok(server.to_string())
        }
        _ => Err(ValidationError::new(
            "ntfy.server",
            "server must be an http:// or https:// URL",
        )),
    }
}

/// Cleans a hostname obtained from a reverse lookup. Never fails: anything
/// that cleans down to nothing becomes [`UNKNOWN_HOST`].
pub fn sanitize_hostname(raw: &str) -> String {
    let without_control = remove_control_chars(raw.trim());
    let truncated = truncate_chars(&without_control, MAX_HOSTNAME_LEN);
    let cleaned: String = strip_dangerous(truncated)
        .chars()
        .filter(|c| !c.is_control() && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        UNKNOWN_HOST.to_string()
    } else {
        cleaned
    }
}

/// Makes an arbitrary string safe to print on one line.
pub fn sanitize_display(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    if cleaned.len() > MAX_DISPLAY_LEN {
        format!("{}...", truncate_chars(&cleaned, MAX_DISPLAY_LEN))
    } else {
        cleaned
    }
}
