//! Container startup bootstrapper for the iflow2api service.
//!
//! Before the service process runs, the bootstrapper provisions the runtime
//! user's state directories, merges environment-variable overrides into the
//! persisted configuration document, materialises the upstream credentials
//! document, and finally drops privileges and replaces its own process image
//! with the service command. Once control is handed off the bootstrapper's
//! lifecycle ends; it never supervises or restarts what it launched, and
//! the service's exit code becomes the container's exit code.
//!
//! The sequence is entirely single threaded and strictly serial. The only
//! shared mutable resource is the filesystem, guarded by an advisory
//! startup lock (see [`lock`]) rather than by any stronger exclusion
//! mechanism.

pub mod bootstrap;
pub mod credentials;
pub mod env;
pub mod errors;
pub mod identity;
pub mod launch;
pub mod lock;
pub mod logging;
pub mod overrides;
pub mod paths;
pub mod provision;
pub mod settings;
pub mod telemetry;

mod files;

pub use bootstrap::{prepare, run, run_with};
pub use env::{Environment, SystemEnvironment};
pub use errors::{BootstrapError, Severity};
pub use identity::{RuntimeIdentity, RuntimeUser};
pub use launch::{LaunchSpec, ProcessImage, SystemProcessImage};
pub use paths::StatePaths;
pub use telemetry::{TelemetryError, TelemetryHandle};

pub(crate) const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");
pub(crate) const PROVISION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::provision");
pub(crate) const LOCK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lock");
pub(crate) const LAUNCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::launch");
