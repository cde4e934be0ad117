//! Advisory lock making the single-writer startup assumption enforceable.
//!
//! Concurrent bootstrapper runs against the same state directory are not a
//! supported scenario; the lock turns that assumption into a detectable
//! condition instead of silent interleaved writes. The lock is acquired
//! after the state directories exist and released immediately before the
//! process image is replaced, since nothing of the bootstrapper survives
//! exec to release it afterwards.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{info, warn};

use crate::LOCK_TARGET;

/// Held advisory lock over the state directory.
#[derive(Debug)]
pub struct StartupLock {
    path: PathBuf,
    _file: File,
}

impl StartupLock {
    /// Acquires the lock, cleaning up a stale one left by a crashed run.
    ///
    /// A lock recording a dead pid, an unparsable pid, or the current
    /// process's own pid is stale. The last case covers containers: the
    /// bootstrapper is pid 1 on every boot, so a surviving lock from a
    /// crashed previous boot records exactly our pid.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true).mode(0o600);
        match options.open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id()).map_err(|source| LockError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!(
                    target: LOCK_TARGET,
                    file = %path.display(),
                    "acquired startup lock"
                );
                Ok(Self {
                    path: path.to_path_buf(),
                    _file: file,
                })
            }
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                handle_existing_lock(path)
            }
            Err(source) => Err(LockError::Create {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Releases the lock ahead of process replacement.
    pub fn release(self) -> Result<(), LockError> {
        fs::remove_file(&self.path).map_err(|source| LockError::Release {
            path: self.path.clone(),
            source,
        })
    }
}

fn handle_existing_lock(path: &Path) -> Result<StartupLock, LockError> {
    if let Some(pid) = read_pid(path)
        && pid != 0
        && pid != std::process::id()
    {
        match check_process(pid) {
            Ok(true) => {
                return Err(LockError::Held { pid });
            }
            Ok(false) => {
                warn!(
                    target: LOCK_TARGET,
                    pid,
                    "lock holder not detected; cleaning stale lock"
                );
            }
            Err(error) => return Err(error),
        }
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(LockError::Cleanup {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    StartupLock::acquire(path)
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn check_process(pid: u32) -> Result<bool, LockError> {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) | Err(Errno::ECHILD) => Ok(false),
        Err(source) => Err(LockError::Probe { pid, source }),
    }
}

/// Errors raised while acquiring or releasing the startup lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Creating the lock file failed.
    #[error("failed to create lock file '{path}': {source}")]
    Create {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Recording the owning pid failed.
    #[error("failed to write lock file '{path}': {source}")]
    Write {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another live bootstrapper holds the lock.
    #[error("startup lock held by running process {pid}")]
    Held {
        /// Pid recorded in the existing lock.
        pid: u32,
    },
    /// Probing the recorded pid failed.
    #[error("failed to check lock holder {pid}: {source}")]
    Probe {
        /// Pid that failed to probe.
        pid: u32,
        /// Underlying OS error.
        source: Errno,
    },
    /// Removing a stale lock failed.
    #[error("failed to remove stale lock '{path}': {source}")]
    Cleanup {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Releasing the lock failed.
    #[error("failed to release lock '{path}': {source}")]
    Release {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
