use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

use chrono::Utc;

const GIT_DIR: &str = "../../.git";

fn main() {
    println!("cargo:rerun-if-env-changed=HOME_SENTRY_BUILD_ID_OVERRIDE");
    println!("cargo:rerun-if-changed={GIT_DIR}/HEAD");
    if let Some(branch) = head_ref() {
        println!("cargo:rerun-if-changed={branch}");
    }

    let built_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let revision = git_revision().unwrap_or_else(|| "unknown".to_string());
    let build_id = match env::var("HOME_SENTRY_BUILD_ID_OVERRIDE") {
        Ok(id) if !id.trim().is_empty() => id,
        _ => format!("{built_at} | {revision}"),
    };

    println!("cargo:rustc-env=HOME_SENTRY_BUILD_ID={build_id}");
    println!("cargo:rustc-env=HOME_SENTRY_BUILT_AT={built_at}");
    println!("cargo:rustc-env=HOME_SENTRY_REVISION={revision}");
}

/// File of the branch HEAD points at; a commit on it triggers a rebuild.
fn head_ref() -> Option<String> {
    let head = fs::read_to_string(format!("{GIT_DIR}/HEAD")).ok()?;
    let branch = format!("{GIT_DIR}/{}", head.strip_prefix("ref: ")?.trim());
    Path::new(&branch).exists().then_some(branch)
}

fn git_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--dirty", "--always"])
        .output()
        .ok()?;
    let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (output.status.success() && !revision.is_empty()).then_some(revision)
}
