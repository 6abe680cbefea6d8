//! Crash-safe file replacement: write a sibling temp file, fsync it, rename
//! it over the target, then fsync the directory.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

#[cfg(target_family = "unix")]
use std::os::unix::fs::OpenOptionsExt;

use crate::paths::ensure_dir;

/// Advisory exclusive lock held for as long as the guard lives.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock file at `path` is exclusively ours.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    let mut temp_name = name.to_os_string();
    temp_name.push(".tmp");
    Ok(path.with_file_name(temp_name))
}

/// Replace `path` with `contents` atomically (owner read/write only on Unix).
#[cfg(target_family = "unix")]
pub fn write_durable(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(dir)?;

    let temp_path = temp_path_for(path)?;
    let mut temp = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&temp_path)?;
    temp.write_all(contents)?;
    temp.sync_all()?;
    drop(temp);

    std::fs::rename(&temp_path, path)?;

    let dir_handle = File::open(dir)?;
    dir_handle.sync_all()?;
    Ok(())
}

#[cfg(not(target_family = "unix"))]
pub fn write_durable(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(dir)?;

    let temp_path = temp_path_for(path)?;
    let mut temp = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    temp.write_all(contents)?;
    temp.sync_all()?;
    drop(temp);

    std::fs::rename(&temp_path, path)?;
    Ok(())
}
