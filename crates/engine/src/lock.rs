// Run lock: one synchronization at a time per working copy.
//
// The lock is a file inside the git directory, created exclusively and
// holding JSON metadata about the holder. It is removed on release or drop.
// A lock whose recorded pid no longer exists was left by a killed run and is
// taken over.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::security::open_private_create_new;

pub const LOCK_FILE_NAME: &str = "mirrorsync.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLockMeta {
    pub pid: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunLockMeta {
    pub fn new(run_id: Uuid) -> Self {
        Self { pid: std::process::id(), run_id, started_at: Utc::now() }
    }
}

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    meta: RunLockMeta,
    released: bool,
}

impl RunLock {
    /// Take the lock in `git_dir`.
    pub fn acquire(git_dir: &Path, run_id: Uuid) -> Result<Self, RunLockError> {
        let path = git_dir.join(LOCK_FILE_NAME);
        reject_symlink(&path)?;

        let meta = RunLockMeta::new(run_id);
        let mut file = match open_private_create_new(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_lock_meta(&path).ok();
                match holder {
                    Some(stale) if !pid_is_alive(stale.pid) => reclaim_stale(&path, &stale)?,
                    _ => return Err(RunLockError::Held { holder, path }),
                }
            }
            Err(error) => return Err(RunLockError::Io { path, source: error }),
        };

        let written = serde_json::to_vec_pretty(&meta)
            .map_err(io::Error::other)
            .and_then(|bytes| file.write_all(&bytes))
            .and_then(|()| file.sync_all());
        if let Err(source) = written {
            let _ = fs::remove_file(&path);
            return Err(RunLockError::Io { path, source });
        }

        Ok(Self { path, meta, released: false })
    }

    pub fn meta(&self) -> &RunLockMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<(), RunLockError> {
        self.released = true;
        fs::remove_file(&self.path)
            .map_err(|source| RunLockError::Io { path: self.path.clone(), source })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Metadata of the current holder, if the lock file exists and is readable.
pub fn read_lock_meta(path: &Path) -> Result<RunLockMeta, RunLockError> {
    reject_symlink(path)?;
    let bytes =
        fs::read(path).map_err(|source| RunLockError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_slice(&bytes)
        .map_err(|error| RunLockError::Io { path: path.to_path_buf(), source: io::Error::other(error) })
}

/// Whether `meta` names a process that no longer exists.
pub fn is_stale(meta: &RunLockMeta) -> bool {
    !pid_is_alive(meta.pid)
}

fn reclaim_stale(path: &Path, stale: &RunLockMeta) -> Result<fs::File, RunLockError> {
    warn!(
        path = %path.display(),
        pid = stale.pid,
        run_id = %stale.run_id,
        started_at = %stale.started_at.to_rfc3339(),
        "taking over run lock left by a process that is gone"
    );
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(RunLockError::Io { path: path.to_path_buf(), source }),
    }
    // A concurrent run may win the race for the fresh file.
    open_private_create_new(path).map_err(|error| {
        if error.kind() == io::ErrorKind::AlreadyExists {
            RunLockError::Held { path: path.to_path_buf(), holder: read_lock_meta(path).ok() }
        } else {
            RunLockError::Io { path: path.to_path_buf(), source: error }
        }
    })
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

fn reject_symlink(path: &Path) -> Result<(), RunLockError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            Err(RunLockError::Symlink { path: path.to_path_buf() })
        }
        _ => Ok(()),
    }
}

#[derive(Debug)]
pub enum RunLockError {
    /// Another run holds the lock. `holder` is `None` when its metadata
    /// could not be read.
    Held { path: PathBuf, holder: Option<RunLockMeta> },
    Symlink { path: PathBuf },
    Io { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for RunLockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Held { path, holder: Some(holder) } => write!(
                f,
                "another sync is running (pid {}, run {}, started {}); lock at `{}`",
                holder.pid,
                holder.run_id,
                holder.started_at.to_rfc3339(),
                path.display()
            ),
            Self::Held { path, holder: None } => write!(
                f,
                "another sync is running; remove `{}` if no sync is in progress",
                path.display()
            ),
            Self::Symlink { path } => {
                write!(f, "run lock path `{}` is a symlink", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "run lock I/O error at `{}`: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for RunLockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
