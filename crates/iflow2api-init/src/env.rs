//! Environment access seam shared by the bootstrap steps.
//!
//! Every step that consults the process environment does so through the
//! [`Environment`] trait so tests can inject a fixed vocabulary instead of
//! mutating global state.

use std::collections::HashMap;
use std::env;

/// Read access to the process environment.
pub trait Environment {
    /// Returns the raw value of `name` when the variable is set.
    fn var(&self, name: &str) -> Option<String>;

    /// Returns the value of `name` when it is set to a non-empty string.
    ///
    /// The bootstrap contract treats an empty string the same as an unset
    /// variable: the corresponding override or default simply does not fire.
    fn non_empty(&self, name: &str) -> Option<String> {
        self.var(name).filter(|value| !value.is_empty())
    }
}

/// Environment backed by the real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}
