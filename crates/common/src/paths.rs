use std::env;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(target_family = "unix")]
use std::os::unix::fs::DirBuilderExt;

/// Overrides the runtime directory (tests, portable installs).
pub const DIR_ENV: &str = "HOME_SENTRY_DIR";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const SETTINGS_LOCK: &str = "settings.lock";
pub const STATE_FILE: &str = "sentry-state.json";

fn non_empty_var(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Resolve the Home Sentry runtime directory.
///
/// `HOME_SENTRY_DIR` wins; otherwise `%APPDATA%\HomeSentry` on Windows and
/// `$XDG_CONFIG_HOME/home-sentry` (falling back to `~/.config`) elsewhere.
pub fn runtime_dir() -> io::Result<PathBuf> {
    if let Some(dir) = non_empty_var(DIR_ENV) {
        return Ok(dir);
    }

    if cfg!(windows) {
        return non_empty_var("APPDATA")
            .map(|appdata| appdata.join("HomeSentry"))
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "APPDATA environment variable missing")
            });
    }

    if let Some(config) = non_empty_var("XDG_CONFIG_HOME") {
        return Ok(config.join("home-sentry"));
    }
    non_empty_var("HOME")
        .map(|home| home.join(".config").join("home-sentry"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME environment variable missing"))
}

/// Create `dir` (and parents) if needed, owner-only on Unix.
#[cfg(target_family = "unix")]
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
}

#[cfg(not(target_family = "unix"))]
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}

pub fn settings_path() -> io::Result<PathBuf> {
    Ok(runtime_dir()?.join(SETTINGS_FILE))
}

pub fn state_path() -> io::Result<PathBuf> {
    Ok(runtime_dir()?.join(STATE_FILE))
}
