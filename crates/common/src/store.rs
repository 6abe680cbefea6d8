use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::durable::{write_durable, FileLock};
use crate::error::{SettingsError, ValidationError};
use crate::mac::MacAddress;
use crate::paths::{runtime_dir, SETTINGS_FILE, SETTINGS_LOCK};
use crate::settings::{Settings, SettingsFile, ShutdownAction, SHUTDOWN_DELAY_RANGE};
use crate::validate::{
    sanitize_display, sanitize_pin, sanitize_server, sanitize_ssid, sanitize_topic,
};

/// `settings.toml` on disk.
///
/// Reads are lock-free (the file is only ever replaced by rename); every
/// write is a read-modify-write under an exclusive lock on a sibling
/// `.lock` file so the daemon and CLI invocations never lose each other's
/// changes.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_file_name(SETTINGS_LOCK);
        Self { path, lock_path }
    }

    /// Store in the default runtime directory.
    pub fn open_default() -> Result<Self, SettingsError> {
        let dir = runtime_dir().map_err(|err| SettingsError::RuntimeDir(err.to_string()))?;
        Ok(Self::new(dir.join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings. A missing file yields defaults; fields that fail
    /// validation are reset to their defaults with a warning.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file yet; using defaults");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let file: SettingsFile =
            toml::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let (settings, issues) = file.into_settings();
        for issue in &issues {
            warn!(
                path = %self.path.display(),
                field = issue.field,
                "invalid setting reset to default: {}",
                issue.message
            );
        }
        Ok(settings)
    }

    /// Overwrite the settings file.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let _lock = self.lock()?;
        self.write(settings)
    }

    /// Locked read-modify-write. Nothing is written when `change` fails.
    pub fn update<F>(&self, change: F) -> Result<Settings, SettingsError>
    where
        F: FnOnce(&mut Settings) -> Result<(), ValidationError>,
    {
        let _lock = self.lock()?;
        let mut settings = self.load()?;
        change(&mut settings)?;
        self.write(&settings)?;
        Ok(settings)
    }

    fn lock(&self) -> Result<FileLock, SettingsError> {
        FileLock::acquire(&self.lock_path).map_err(|source| SettingsError::Write {
            path: self.lock_path.clone(),
            source,
        })
    }

    fn write(&self, settings: &Settings) -> Result<(), SettingsError> {
        let text = toml::to_string_pretty(&SettingsFile::from(settings))?;
        write_durable(&self.path, text.as_bytes()).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    pub fn set_home_ssid(&self, ssid: &str) -> Result<Settings, SettingsError> {
        let ssid = sanitize_ssid(ssid)?;
        self.update(|settings| {
            settings.home_ssid = ssid;
            Ok(())
        })
    }

    /// Select the monitored device. `ip` and `name` are kept for display.
    pub fn set_device(
        &self,
        mac: MacAddress,
        ip: Option<Ipv4Addr>,
        name: Option<&str>,
    ) -> Result<Settings, SettingsError> {
        let name = name.map(|name| sanitize_display(name.trim())).unwrap_or_default();
        self.update(|settings| {
            settings.device_mac = Some(mac);
            settings.device_ip = ip;
            settings.device_name = name;
            Ok(())
        })
    }

    pub fn clear_device(&self) -> Result<Settings, SettingsError> {
        self.update(|settings| {
            settings.device_mac = None;
            settings.device_ip = None;
            settings.device_name.clear();
            Ok(())
        })
    }

    pub fn set_paused(&self, paused: bool) -> Result<Settings, SettingsError> {
        let updated = self.update(|settings| {
            settings.is_paused = paused;
            Ok(())
        })?;
        info!(paused, "protection pause flag saved");
        Ok(updated)
    }

    pub fn set_shutdown_delay(&self, secs: u64) -> Result<Settings, SettingsError> {
        if !SHUTDOWN_DELAY_RANGE.contains(&secs) {
            return Err(ValidationError::new(
                "shutdown_delay_secs",
                format!(
                    "delay must be between {} and {} seconds",
                    SHUTDOWN_DELAY_RANGE.start(),
                    SHUTDOWN_DELAY_RANGE.end()
                ),
            )
            .into());
        }
        self.update(|settings| {
            settings.shutdown_delay_secs = secs;
            Ok(())
        })
    }

    pub fn set_shutdown_action(&self, action: ShutdownAction) -> Result<Settings, SettingsError> {
        self.update(|settings| {
            settings.shutdown_action = action;
            Ok(())
        })
    }

    /// Store a new PIN and require it. An empty PIN removes the requirement.
    pub fn set_pin(&self, pin: &str) -> Result<Settings, SettingsError> {
        let pin = sanitize_pin(pin)?;
        self.update(|settings| {
            settings.require_pin = !pin.is_empty();
            settings.shutdown_pin = pin;
            Ok(())
        })
    }

    pub fn set_require_pin(&self, required: bool) -> Result<Settings, SettingsError> {
        self.update(|settings| {
            if required && settings.shutdown_pin.is_empty() {
                return Err(ValidationError::new(
                    "require_pin",
                    "set a PIN before requiring it",
                ));
            }
            settings.require_pin = required;
            Ok(())
        })
    }

    /// Configure the push channel. Enabling without any topic generates a
    /// random one so the phone app has something to subscribe to.
    pub fn set_ntfy(
        &self,
        enabled: bool,
        server: Option<&str>,
        topic: Option<&str>,
    ) -> Result<Settings, SettingsError> {
        let server = server.map(sanitize_server).transpose()?;
        let topic = topic.map(sanitize_topic).transpose()?;
        self.update(|settings| {
            settings.ntfy.enabled = enabled;
            if let Some(server) = server {
                settings.ntfy.server = server;
            }
            if let Some(topic) = topic {
                settings.ntfy.topic = topic;
            }
            if enabled && settings.ntfy.topic.is_empty() {
                settings.ntfy.topic = generate_topic();
                info!(topic = %settings.ntfy.topic, "generated push notification topic");
            }
            Ok(())
        })
    }
}

fn generate_topic() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    format!("home-sentry-{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileSettingsStore) {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path().join(SETTINGS_FILE));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_defaults() {
        let (_dir, store) = store();
        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn unparsable_file_is_an_error_not_defaults() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "grace_checks = [").unwrap();
        assert!(matches!(store.load(), Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn updates_persist_and_preserve_other_fields() {
        let (_dir, store) = store();
        store.set_home_ssid("HomeNet").unwrap();
        let mac: MacAddress = "a4:83:e7:12:34:56".parse().unwrap();
        store
            .set_device(mac, Some(Ipv4Addr::new(192, 168, 1, 42)), Some("pixel"))
            .unwrap();
        store.set_paused(true).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.home_ssid, "HomeNet");
        assert_eq!(loaded.device_mac, Some(mac));
        assert_eq!(loaded.device_name, "pixel");
        assert!(loaded.is_paused);

        store.clear_device().unwrap();
        let loaded = store.load().unwrap();
        assert!(!loaded.has_device_configured());
        assert_eq!(loaded.home_ssid, "HomeNet");
    }

    #[test]
    fn rejected_changes_write_nothing() {
        let (_dir, store) = store();
        assert!(store.set_home_ssid("<bad>").is_err());
        assert!(store.set_shutdown_delay(4).is_err());
        assert!(store.set_shutdown_delay(301).is_err());
        assert!(store.set_require_pin(true).is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn pin_lifecycle() {
        let (_dir, store) = store();
        let settings = store.set_pin("2468").unwrap();
        assert!(settings.pin_required());

        let settings = store.set_require_pin(false).unwrap();
        assert!(!settings.pin_required());
        assert_eq!(settings.shutdown_pin, "2468");

        let settings = store.set_pin("").unwrap();
        assert!(!settings.require_pin);
        assert!(settings.shutdown_pin.is_empty());
    }

    #[test]
    fn enabling_ntfy_generates_a_topic_once() {
        let (_dir, store) = store();
        let first = store.set_ntfy(true, None, None).unwrap();
        assert!(first.ntfy.topic.starts_with("home-sentry-"));
        assert!(first.ntfy.is_ready());

        let second = store.set_ntfy(true, Some("https://push.example.org/"), None).unwrap();
        assert_eq!(second.ntfy.topic, first.ntfy.topic);
        assert_eq!(second.ntfy.server, "https://push.example.org");

        let disabled = store.set_ntfy(false, None, None).unwrap();
        assert!(!disabled.ntfy.is_ready());
    }
}
