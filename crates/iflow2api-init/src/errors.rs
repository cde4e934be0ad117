//! Top-level error type and severity taxonomy for the bootstrap sequence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::identity::IdentityError;
use crate::launch::LaunchError;
use crate::lock::LockError;
use crate::overrides::CoercionError;
use crate::provision::ProvisionError;
use crate::telemetry::TelemetryError;

/// Failure class declared by each bootstrap outcome.
///
/// The sequence distinguishes three classes: conditions that abort startup,
/// conditions silently repaired from a corrupt starting state, and
/// conditions logged and ignored. Outcomes expose their class so tests can
/// assert on the declared behaviour rather than on side effects alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Startup aborts with a non-zero exit before the service is exec'd.
    Fatal,
    /// A corrupt starting state was replaced with an empty one.
    Recovered,
    /// The failure was logged and startup continued.
    BestEffort,
}

/// Errors surfaced while bootstrapping the container.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Resolving the runtime identity failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// Creating a state directory failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    /// Acquiring or releasing the startup lock failed.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// An environment override value could not be coerced.
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    /// Installing the merged configuration document failed.
    #[error("failed to write configuration document '{path}': {source}")]
    ConfigWrite {
        /// Configuration document path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Installing the credentials document failed.
    #[error("failed to write credentials document '{path}': {source}")]
    CredentialWrite {
        /// Credentials document path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Finalising or executing the service command failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// Telemetry initialisation failed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

impl BootstrapError {
    /// Declared severity of the error.
    ///
    /// Everything surfaced through the error channel aborts startup;
    /// recovered and best-effort conditions are reported on the step
    /// outcomes instead.
    pub const fn severity(&self) -> Severity {
        Severity::Fatal
    }
}
