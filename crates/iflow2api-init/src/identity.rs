//! Runtime identity resolution and privilege detection.
//!
//! The container image runs the bootstrapper as root so it can repair
//! ownership of bind-mounted state, then drops to the unprivileged service
//! account before exec. When the container is started with `--user` the
//! bootstrapper is already unprivileged and both the ownership fixes and the
//! privilege drop are skipped.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::{Gid, Uid, User};
use thiserror::Error;

/// Account the service runs under.
pub const RUNTIME_USER: &str = "iflow2api";

/// Group the service runs under.
pub const RUNTIME_GROUP: &str = "iflow2api";

/// Unprivileged account the service is exec'd as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeUser {
    /// Account name, exported as `USER` before exec.
    pub name: String,
    /// Numeric user id adopted before exec.
    pub uid: Uid,
    /// Numeric primary group id adopted before exec.
    pub gid: Gid,
    /// Home directory, exported as `HOME` before exec.
    pub home: PathBuf,
}

/// Identity the bootstrapper provisions state for.
#[derive(Debug, Clone)]
pub struct RuntimeIdentity {
    home: PathBuf,
    drop_target: Option<RuntimeUser>,
}

impl RuntimeIdentity {
    /// Resolves the identity from the current process credentials.
    ///
    /// A privileged process resolves the [`RUNTIME_USER`] account and will
    /// later drop to it; an unprivileged process keeps its own identity and
    /// home directory.
    pub fn resolve() -> Result<Self, IdentityError> {
        if Uid::effective().is_root() {
            let user = User::from_name(RUNTIME_USER)
                .map_err(|source| IdentityError::Lookup {
                    name: RUNTIME_USER.to_owned(),
                    source,
                })?
                .ok_or_else(|| IdentityError::UnknownUser {
                    name: RUNTIME_USER.to_owned(),
                })?;
            Ok(Self {
                home: user.dir.clone(),
                drop_target: Some(RuntimeUser {
                    name: user.name,
                    uid: user.uid,
                    gid: user.gid,
                    home: user.dir,
                }),
            })
        } else {
            let home = dirs::home_dir().ok_or(IdentityError::MissingHome)?;
            Ok(Self {
                home,
                drop_target: None,
            })
        }
    }

    /// Builds an identity that provisions `home` without any privilege drop.
    pub fn unprivileged(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            drop_target: None,
        }
    }

    /// Builds an identity that provisions the user's home and drops to them.
    pub fn privileged(user: RuntimeUser) -> Self {
        Self {
            home: user.home.clone(),
            drop_target: Some(user),
        }
    }

    /// Home directory the state lives under.
    pub fn home(&self) -> &Path {
        self.home.as_path()
    }

    /// Account to drop to before exec, when running privileged.
    pub const fn drop_target(&self) -> Option<&RuntimeUser> {
        self.drop_target.as_ref()
    }

    /// Ownership applied to directories and documents, when privileged.
    pub fn owner(&self) -> Option<(Uid, Gid)> {
        self.drop_target.as_ref().map(|user| (user.uid, user.gid))
    }
}

/// Errors raised while resolving the runtime identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Querying the account database failed.
    #[error("failed to look up account '{name}': {source}")]
    Lookup {
        /// Account that was being resolved.
        name: String,
        /// Underlying OS error.
        source: Errno,
    },
    /// The runtime account does not exist in the image.
    #[error("runtime account '{name}' does not exist")]
    UnknownUser {
        /// Missing account name.
        name: String,
    },
    /// No home directory could be determined for the current user.
    #[error("could not determine a home directory for the current user")]
    MissingHome,
}
