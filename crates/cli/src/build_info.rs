//! Build identification stamped by `build.rs`.

/// `"<UTC build time> | <git describe>"`, or the override given at build time.
pub const BUILD_ID: &str = env!("HOME_SENTRY_BUILD_ID");
pub const BUILT_AT: &str = env!("HOME_SENTRY_BUILT_AT");
pub const REVISION: &str = env!("HOME_SENTRY_REVISION");

/// `home-sentry <version> | <build id>`
pub fn banner() -> String {
    format!("home-sentry {} | {}", env!("CARGO_PKG_VERSION"), BUILD_ID)
}
