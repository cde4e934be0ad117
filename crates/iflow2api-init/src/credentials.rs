//! Materialises the upstream credentials document consumed by the service.
//!
//! Unlike the configuration merge, the credentials document is replaced
//! wholesale: a partial credentials file is not meaningful, so the writer
//! either installs a complete document or leaves the existing one alone.

use std::io;
use std::path::Path;

use nix::unistd::{Gid, Uid};
use serde::{Deserialize, Serialize};

use crate::env::Environment;
use crate::files::atomic_write;

/// Primary credential; the writer only runs when this is non-empty.
pub const API_KEY_VAR: &str = "IFLOW_API_KEY";

/// Optional base endpoint override.
pub const BASE_URL_VAR: &str = "IFLOW_BASE_URL";

/// Optional authentication mode override.
pub const AUTH_TYPE_VAR: &str = "IFLOW_AUTH_TYPE";

/// Set to exactly `1` to overwrite an existing credentials document.
pub const FORCE_VAR: &str = "IFLOW_SETTINGS_FORCE";

/// Base endpoint applied when [`BASE_URL_VAR`] is unset or empty.
pub const DEFAULT_BASE_URL: &str = "https://apis.iflow.cn/v1";

/// Authentication mode applied when [`AUTH_TYPE_VAR`] is unset or empty.
pub const DEFAULT_AUTH_TYPE: &str = "api-key";

/// Fixed-shape credentials document, serialised in the iFlow CLI's own
/// field naming so the service can read it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDocument {
    /// Upstream API key.
    #[serde(rename = "apiKey")]
    pub api_key: String,
    /// Upstream base endpoint.
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    /// Authentication mode advertised to the service.
    #[serde(rename = "selectedAuthType")]
    pub auth_type: String,
}

impl CredentialDocument {
    /// Builds the document from the environment.
    ///
    /// Returns `None` when the primary credential is unset or empty; the
    /// secondary fields fall back to fixed defaults.
    pub fn from_environment(env: &impl Environment) -> Option<Self> {
        let api_key = env.non_empty(API_KEY_VAR)?;
        Some(Self {
            api_key,
            base_url: env
                .non_empty(BASE_URL_VAR)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            auth_type: env
                .non_empty(AUTH_TYPE_VAR)
                .unwrap_or_else(|| DEFAULT_AUTH_TYPE.to_owned()),
        })
    }
}

/// What the credential writer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOutcome {
    /// A complete document was installed.
    Written,
    /// An existing document was left untouched and no force flag was set.
    PreservedExisting,
    /// No primary credential was supplied; the step did not run.
    NoCredential,
}

/// Materialises the credentials document, honouring the existence policy.
///
/// The document is created when absent and overwritten only when
/// [`FORCE_VAR`] is exactly `1`. Persistence follows the same atomic
/// write, permission, and ownership contract as the configuration merge.
pub fn materialise(
    path: &Path,
    env: &impl Environment,
    owner: Option<(Uid, Gid)>,
) -> io::Result<CredentialOutcome> {
    let Some(document) = CredentialDocument::from_environment(env) else {
        return Ok(CredentialOutcome::NoCredential);
    };
    let forced = env.var(FORCE_VAR).as_deref() == Some("1");
    if path.exists() && !forced {
        return Ok(CredentialOutcome::PreservedExisting);
    }
    let mut payload = serde_json::to_vec_pretty(&document)?;
    payload.push(b'\n');
    atomic_write(path, &payload, owner)?;
    Ok(CredentialOutcome::Written)
}
