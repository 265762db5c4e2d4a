//! File system helpers: directories, YAML documents and the per-log lock file.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, ResultLogError};

// ─── Directory helpers ────────────────────────────────────────────────────────

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Creates the parent directory of `path` if it has one.
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

// ─── YAML I/O ────────────────────────────────────────────────────────────────

pub fn save_yaml<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    ensure_parent(path)?;
    let content = serde_yaml::to_string(data)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn load_yaml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

// ─── Lock file ───────────────────────────────────────────────────────────────

/// Sidecar path used to mark a log as held open: `<log>.lck`.
pub fn lock_path(log_path: &Path) -> PathBuf {
    let mut name = OsString::from(log_path.as_os_str());
    name.push(".lck");
    PathBuf::from(name)
}

/// Exclusive claim on a log file.
///
/// Held as an OS advisory lock on the `.lck` sidecar, so it is released when
/// the guard drops and also when the owning process dies. The sidecar itself
/// stays on disk; only the lock on it matters.
#[derive(Debug)]
pub(crate) struct LockGuard {
    _file: File,
}

impl LockGuard {
    pub(crate) fn acquire(log_path: &Path) -> Result<Self> {
        let path = lock_path(log_path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(ResultLogError::ResourceBusy(log_path.to_path_buf()));
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        // The pid is informational only; a failed write still leaves a valid lock.
        if let Err(e) = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
        {
            warn!(lock = %path.display(), "Failed to write lock owner: {}", e);
        }
        debug!(lock = %path.display(), "Lock acquired");
        Ok(Self { _file: file })
    }
}
