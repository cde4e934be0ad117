//! Derives the state paths provisioned under the runtime user's home.
//!
//! Both the bootstrapper and the service need to agree on this layout: the
//! service reads `~/.iflow/settings.json` for upstream credentials and keeps
//! its own state under `~/.iflow2api`.

use std::path::{Path, PathBuf};

const IFLOW_DIR: &str = ".iflow";
const STATE_DIR: &str = ".iflow2api";
const INSTANCES_DIR: &str = "instances";
const CONFIG_FILE: &str = "config.json";
const SETTINGS_FILE: &str = "settings.json";
const LOCK_FILE: &str = "init.lock";

/// Canonical state paths rooted at the runtime user's home directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    iflow_dir: PathBuf,
    state_dir: PathBuf,
    instances_dir: PathBuf,
    config_path: PathBuf,
    settings_path: PathBuf,
    lock_path: PathBuf,
}

impl StatePaths {
    /// Derives the state layout from a home directory.
    pub fn from_home(home: &Path) -> Self {
        let iflow_dir = home.join(IFLOW_DIR);
        let state_dir = home.join(STATE_DIR);
        Self {
            instances_dir: state_dir.join(INSTANCES_DIR),
            config_path: state_dir.join(CONFIG_FILE),
            settings_path: iflow_dir.join(SETTINGS_FILE),
            lock_path: state_dir.join(LOCK_FILE),
            iflow_dir,
            state_dir,
        }
    }

    /// Directories created (and owned) before any document is written.
    pub fn state_directories(&self) -> [&Path; 3] {
        [
            self.iflow_dir.as_path(),
            self.state_dir.as_path(),
            self.instances_dir.as_path(),
        ]
    }

    /// Credential store consumed by the service's iFlow client.
    pub fn iflow_dir(&self) -> &Path {
        self.iflow_dir.as_path()
    }

    /// Service state directory.
    pub fn state_dir(&self) -> &Path {
        self.state_dir.as_path()
    }

    /// Per-instance configuration directory.
    pub fn instances_dir(&self) -> &Path {
        self.instances_dir.as_path()
    }

    /// Merged service configuration document.
    pub fn config_path(&self) -> &Path {
        self.config_path.as_path()
    }

    /// Upstream credentials document.
    pub fn settings_path(&self) -> &Path {
        self.settings_path.as_path()
    }

    /// Advisory lock guarding the single-writer startup assumption.
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }
}
