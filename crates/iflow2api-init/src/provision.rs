//! Idempotent provisioning of the runtime user's state directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid, chown};
use thiserror::Error;
use tracing::{debug, warn};

use crate::PROVISION_TARGET;
use crate::errors::Severity;
use crate::paths::StatePaths;

/// Outcome of a provisioning pass.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    /// Directories created by this pass (pre-existing ones are not listed).
    pub created: Vec<PathBuf>,
    /// Ownership reassignments that failed and were ignored.
    pub ownership_failures: Vec<OwnershipFailure>,
}

/// A best-effort ownership reassignment that did not take effect.
///
/// Pre-existing bind-mounted state with foreign ownership must not abort
/// startup, so these are recorded and logged rather than raised.
#[derive(Debug)]
pub struct OwnershipFailure {
    /// Path whose ownership could not be changed.
    pub path: PathBuf,
    /// Underlying OS error.
    pub source: io::Error,
}

impl OwnershipFailure {
    /// Declared severity of the failure.
    pub const fn severity(&self) -> Severity {
        Severity::BestEffort
    }
}

/// Errors raised while creating state directories.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Creating a state directory failed.
    #[error("failed to create state directory '{path}': {source}")]
    Create {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Ensures every state directory exists, reassigning ownership when privileged.
///
/// Directory creation is idempotent and fatal on failure. Ownership
/// reassignment is recursive and best-effort: failures are recorded in the
/// report and logged, never raised.
pub fn ensure_directories(
    paths: &StatePaths,
    owner: Option<(Uid, Gid)>,
) -> Result<ProvisionReport, ProvisionError> {
    let mut report = ProvisionReport::default();
    for directory in paths.state_directories() {
        if !directory.exists() {
            fs::create_dir_all(directory).map_err(|source| ProvisionError::Create {
                path: directory.to_path_buf(),
                source,
            })?;
            debug!(
                target: PROVISION_TARGET,
                directory = %directory.display(),
                "created state directory"
            );
            report.created.push(directory.to_path_buf());
        }
    }
    if let Some((uid, gid)) = owner {
        for directory in paths.state_directories() {
            reassign_ownership(directory, uid, gid, &mut report.ownership_failures);
        }
    }
    for failure in &report.ownership_failures {
        warn!(
            target: PROVISION_TARGET,
            path = %failure.path.display(),
            error = %failure.source,
            "ownership reassignment failed; continuing"
        );
    }
    Ok(report)
}

fn reassign_ownership(path: &Path, uid: Uid, gid: Gid, failures: &mut Vec<OwnershipFailure>) {
    if let Err(errno) = chown(path, Some(uid), Some(gid)) {
        failures.push(OwnershipFailure {
            path: path.to_path_buf(),
            source: io::Error::from(errno),
        });
        return;
    }
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(source) => {
            failures.push(OwnershipFailure {
                path: path.to_path_buf(),
                source,
            });
            return;
        }
    };
    for entry in entries {
        match entry {
            Ok(entry) => {
                let entry_path = entry.path();
                if entry_path.is_dir() {
                    reassign_ownership(&entry_path, uid, gid, failures);
                } else if let Err(errno) = chown(&entry_path, Some(uid), Some(gid)) {
                    failures.push(OwnershipFailure {
                        path: entry_path,
                        source: io::Error::from(errno),
                    });
                }
            }
            Err(source) => failures.push(OwnershipFailure {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
