//! Merges environment overrides into the persisted service configuration.
//!
//! The configuration document is a flat JSON object the service owns;
//! the bootstrapper performs a partial update, never a full replace, so
//! settings edited through the service's admin interface survive restarts
//! that do not override them.

use std::io;
use std::path::Path;

use nix::unistd::{Gid, Uid};
use serde_json::{Map, Value};

use crate::env::Environment;
use crate::errors::Severity;
use crate::files::atomic_write;
use crate::overrides::{Coercion, CoercionError, OverrideRule};

/// Override vocabulary for the service configuration document.
///
/// Keys mirror the settings the service reads from
/// `~/.iflow2api/config.json`; unrecognised environment variables are
/// ignored entirely.
pub const CONFIG_OVERRIDES: [OverrideRule; 7] = [
    OverrideRule::new("IFLOW2API_ADMIN_ENABLED", "admin_enabled", Coercion::Boolean),
    OverrideRule::new(
        "IFLOW2API_RATE_LIMIT_ENABLED",
        "rate_limit_enabled",
        Coercion::Boolean,
    ),
    OverrideRule::new(
        "IFLOW2API_REQUESTS_PER_MINUTE",
        "requests_per_minute",
        Coercion::Integer,
    ),
    OverrideRule::new(
        "IFLOW2API_REQUESTS_PER_HOUR",
        "requests_per_hour",
        Coercion::Integer,
    ),
    OverrideRule::new(
        "IFLOW2API_REQUESTS_PER_DAY",
        "requests_per_day",
        Coercion::Integer,
    ),
    OverrideRule::new("IFLOW2API_INSTANCES", "instances", Coercion::Integer),
    OverrideRule::new("IFLOW2API_MODEL_NAME", "model_name", Coercion::None),
];

/// Result of merging overrides into the existing document.
#[derive(Debug)]
pub struct MergeOutcome {
    /// The merged document.
    pub document: Map<String, Value>,
    /// Number of override rules that fired.
    pub applied: usize,
    /// Whether a present-but-unusable existing document was discarded.
    pub recovered: bool,
}

impl MergeOutcome {
    /// Whether the document should be written back to disk.
    ///
    /// A merge with no applied overrides is a no-op and must not rewrite
    /// the file, which would needlessly reset its permissions and
    /// ownership.
    pub const fn should_persist(&self) -> bool {
        self.applied > 0
    }

    /// Severity of the recovery, when one happened.
    pub const fn recovery(&self) -> Option<Severity> {
        if self.recovered {
            Some(Severity::Recovered)
        } else {
            None
        }
    }
}

/// Whether any override variable is set and non-empty.
///
/// Gates the whole merge step: when nothing is overridden this run, the
/// existing document is left entirely untouched.
pub fn any_override_present(env: &impl Environment) -> bool {
    CONFIG_OVERRIDES
        .iter()
        .any(|rule| env.non_empty(rule.variable).is_some())
}

/// Loads the existing document, or an empty mapping when it is unusable.
///
/// Returns the mapping and whether a present document had to be discarded
/// (read failure, parse failure, or a non-object payload). A missing file
/// is an ordinary first boot, not a recovery.
pub fn load_document(path: &Path) -> (Map<String, Value>, bool) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => return (Map::new(), error.kind() != io::ErrorKind::NotFound),
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => (map, false),
        _ => (Map::new(), true),
    }
}

/// Applies the override rules to the document at `path`.
///
/// The starting document is loaded leniently per [`load_document`];
/// coercion failures are fatal. Keys not targeted by a fired rule are
/// preserved unchanged.
pub fn merge(
    path: &Path,
    rules: &[OverrideRule],
    env: &impl Environment,
) -> Result<MergeOutcome, CoercionError> {
    let (mut document, recovered) = load_document(path);
    let mut applied = 0;
    for rule in rules {
        if let Some(value) = rule.evaluate(env)? {
            document.insert(rule.key.to_owned(), value);
            applied += 1;
        }
    }
    Ok(MergeOutcome {
        document,
        applied,
        recovered,
    })
}

/// Persists the merged document atomically with owner-only permissions.
pub fn persist(
    path: &Path,
    document: &Map<String, Value>,
    owner: Option<(Uid, Gid)>,
) -> io::Result<()> {
    let mut payload = serde_json::to_vec_pretty(document)?;
    payload.push(b'\n');
    atomic_write(path, &payload, owner)
}
