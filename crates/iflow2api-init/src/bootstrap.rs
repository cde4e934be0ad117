//! Orchestrates the strictly serial bootstrap sequence.
//!
//! Directories are provisioned first, the configuration merge and the
//! credential writer run conditionally, and the launcher always runs last.
//! Every step blocks until the previous one completes; the first fatal
//! condition aborts the sequence and nothing is retried. Recovery is the
//! container orchestrator's restart policy, not ours.

use std::convert::Infallible;
use std::env;
use std::ffi::OsString;

use tracing::{info, warn};

use crate::BOOTSTRAP_TARGET;
use crate::credentials;
use crate::env::{Environment, SystemEnvironment};
use crate::errors::BootstrapError;
use crate::identity::RuntimeIdentity;
use crate::launch::{self, LaunchSpec, ProcessImage, SystemProcessImage};
use crate::lock::StartupLock;
use crate::paths::StatePaths;
use crate::provision;
use crate::settings::{self, CONFIG_OVERRIDES};

/// Runs the bootstrap sequence with the production collaborators.
///
/// On success this function does not return: the process image has been
/// replaced by the service command.
pub fn run() -> Result<Infallible, BootstrapError> {
    let identity = RuntimeIdentity::resolve()?;
    let args: Vec<OsString> = env::args_os().skip(1).collect();
    run_with(&args, &SystemEnvironment, &identity, &SystemProcessImage)
}

/// Runs the bootstrap sequence with injected collaborators.
pub fn run_with(
    args: &[OsString],
    env: &impl Environment,
    identity: &RuntimeIdentity,
    image: &impl ProcessImage,
) -> Result<Infallible, BootstrapError> {
    let spec = prepare(args, env, identity)?;
    image.replace(&spec).map_err(BootstrapError::from)
}

/// Provisions state and produces the final launch spec.
///
/// This is everything except the terminal process replacement, split out
/// so the sequence can be exercised end to end by tests.
pub fn prepare(
    args: &[OsString],
    env: &impl Environment,
    identity: &RuntimeIdentity,
) -> Result<LaunchSpec, BootstrapError> {
    let paths = StatePaths::from_home(identity.home());

    let report = provision::ensure_directories(&paths, identity.owner())?;
    info!(
        target: BOOTSTRAP_TARGET,
        created = report.created.len(),
        ownership_failures = report.ownership_failures.len(),
        "state directories provisioned"
    );

    let lock = StartupLock::acquire(paths.lock_path())?;

    if settings::any_override_present(env) {
        let outcome = settings::merge(paths.config_path(), &CONFIG_OVERRIDES, env)?;
        if outcome.recovered {
            warn!(
                target: BOOTSTRAP_TARGET,
                document = %paths.config_path().display(),
                "existing configuration document was unusable; starting from empty"
            );
        }
        if outcome.should_persist() {
            settings::persist(paths.config_path(), &outcome.document, identity.owner()).map_err(
                |source| BootstrapError::ConfigWrite {
                    path: paths.config_path().to_path_buf(),
                    source,
                },
            )?;
            info!(
                target: BOOTSTRAP_TARGET,
                applied = outcome.applied,
                document = %paths.config_path().display(),
                "configuration overrides merged"
            );
        }
    }

    let outcome = credentials::materialise(paths.settings_path(), env, identity.owner()).map_err(
        |source| BootstrapError::CredentialWrite {
            path: paths.settings_path().to_path_buf(),
            source,
        },
    )?;
    info!(
        target: BOOTSTRAP_TARGET,
        outcome = ?outcome,
        document = %paths.settings_path().display(),
        "credentials step completed"
    );

    // Nothing of the bootstrapper survives exec, so the lock is released
    // before handing over rather than after.
    lock.release()?;

    Ok(LaunchSpec {
        argv: launch::build_argv(args, env),
        target: identity.drop_target().cloned(),
    })
}
