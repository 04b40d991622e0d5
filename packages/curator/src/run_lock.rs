//! Exclusive lock file preventing overlapping cycles.
//!
//! The file holds the owner's PID. A lock whose owner is no longer running
//! (killed, crashed before `Drop`) is taken over on the next acquire.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::RunLockError;

/// Held for the lifetime of a run; the file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, RunLockError> {
        let path = path.into();

        match Self::create(&path) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            other => return other.map(|()| Self { path }).map_err(Into::into),
        }

        match read_owner(&path)? {
            Some(pid) if process_alive(pid) => Err(RunLockError::Held { path, pid }),
            // unreadable content is a writer between create and write
            None => Err(RunLockError::Held { path, pid: 0 }),
            Some(pid) => {
                warn!(path = %path.display(), pid, "Taking over lock left by a dead run");
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != ErrorKind::NotFound {
                        return Err(e.into());
                    }
                }
                match Self::create(&path) {
                    Ok(()) => Ok(Self { path }),
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        let pid = read_owner(&path)?.unwrap_or(0);
                        Err(RunLockError::Held { path, pid })
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn create(path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove run lock");
        }
    }
}

/// PID recorded in a lock file, `None` if empty or garbled.
fn read_owner(path: &Path) -> Result<Option<u32>, RunLockError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse().ok()),
        // released between our create attempt and the read
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Some(0)),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // signal 0 only checks existence; EPERM means another user owns it
    !matches!(kill(Pid::from_raw(raw), None::<Signal>), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn process_alive(pid: u32) -> bool {
    pid != 0
}

/// Filesystem path of a SQLite database URL, if it names a file.
pub fn database_file(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let path = rest.split('?').next().unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// `<database>.lock` next to a file database, else a fixed temp-dir path.
pub fn lock_path_for(database_url: &str) -> PathBuf {
    match database_file(database_url) {
        Some(db) => {
            let mut name = db.into_os_string();
            name.push(".lock");
            PathBuf::from(name)
        }
        None => std::env::temp_dir().join("job-curator.lock"),
    }
}
