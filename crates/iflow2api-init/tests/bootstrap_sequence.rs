//! Integration tests for restart behaviour of the bootstrap sequence.

use std::collections::HashMap;
use std::convert::Infallible;
use std::ffi::OsString;
use std::fs;

use rstest::rstest;
use serde_json::Value;
use tempfile::TempDir;

use iflow2api_init::launch::LaunchError;
use iflow2api_init::{
    BootstrapError, LaunchSpec, ProcessImage, RuntimeIdentity, StatePaths, prepare, run_with,
};

fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect()
}

fn prepare_in(home: &TempDir, env: &HashMap<String, String>) -> LaunchSpec {
    let identity = RuntimeIdentity::unprivileged(home.path());
    prepare(&[] as &[OsString], env, &identity).expect("bootstrap sequence should succeed")
}

#[rstest]
fn overrides_survive_a_boot_without_the_variable() {
    let home = TempDir::new().expect("temporary home");
    let paths = StatePaths::from_home(home.path());

    prepare_in(&home, &env_of(&[("IFLOW2API_INSTANCES", "4")]));
    let first: Value = serde_json::from_str(
        &fs::read_to_string(paths.config_path()).expect("configuration readable"),
    )
    .expect("configuration parses");
    assert_eq!(first.get("instances"), Some(&Value::from(4)));

    // Second boot without the variable: the document is not rewritten and
    // the value survives.
    prepare_in(&home, &HashMap::new());
    let second: Value = serde_json::from_str(
        &fs::read_to_string(paths.config_path()).expect("configuration readable"),
    )
    .expect("configuration parses");
    assert_eq!(second.get("instances"), Some(&Value::from(4)));
}

#[rstest]
fn configuration_is_not_created_without_overrides() {
    let home = TempDir::new().expect("temporary home");
    let paths = StatePaths::from_home(home.path());

    prepare_in(&home, &HashMap::new());

    assert!(!paths.config_path().exists());
    for directory in paths.state_directories() {
        assert!(directory.is_dir());
    }
}

#[rstest]
fn credentials_are_preserved_across_boots() {
    let home = TempDir::new().expect("temporary home");
    let paths = StatePaths::from_home(home.path());

    prepare_in(&home, &env_of(&[("IFLOW_API_KEY", "sk-first")]));
    prepare_in(&home, &env_of(&[("IFLOW_API_KEY", "sk-second")]));

    let document: Value = serde_json::from_str(
        &fs::read_to_string(paths.settings_path()).expect("credentials readable"),
    )
    .expect("credentials parse");
    assert_eq!(document.get("apiKey"), Some(&Value::from("sk-first")));
}

#[rstest]
fn startup_lock_is_released_before_launch() {
    let home = TempDir::new().expect("temporary home");
    let paths = StatePaths::from_home(home.path());

    prepare_in(&home, &HashMap::new());

    assert!(!paths.lock_path().exists());
}

#[rstest]
fn diagnostic_arguments_reach_the_launch_spec_unchanged() {
    let home = TempDir::new().expect("temporary home");
    let identity = RuntimeIdentity::unprivileged(home.path());
    let args: Vec<OsString> = ["bash", "-lc", "env"].iter().map(OsString::from).collect();

    let spec = prepare(&args, &HashMap::new(), &identity).expect("sequence should succeed");

    assert_eq!(spec.argv, args);
}

struct RefusingImage;

impl ProcessImage for RefusingImage {
    fn replace(&self, _spec: &LaunchSpec) -> Result<Infallible, LaunchError> {
        Err(LaunchError::EmptyCommand)
    }
}

#[rstest]
fn launch_failures_propagate_as_fatal() {
    let home = TempDir::new().expect("temporary home");
    let identity = RuntimeIdentity::unprivileged(home.path());

    let error = run_with(
        &[] as &[OsString],
        &HashMap::new(),
        &identity,
        &RefusingImage,
    )
    .expect_err("refusing image must surface an error");

    assert!(matches!(error, BootstrapError::Launch(_)));
    assert_eq!(error.severity(), iflow2api_init::Severity::Fatal);
}
