//! Finalises the service command line and replaces the process image.
//!
//! The launcher is the terminal step of the bootstrap: on success the
//! bootstrapper ceases to exist and the service inherits its pid, its open
//! file descriptors, and its environment. The exec is modelled as an
//! operation returning [`Infallible`] so the success path provably never
//! returns and no cleanup can be written after it.

use std::convert::Infallible;
use std::env;
use std::ffi::{CString, NulError, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use nix::errno::Errno;
use nix::unistd::{execvp, setgid, setgroups, setuid};
use thiserror::Error;
use tracing::info;

use crate::LAUNCH_TARGET;
use crate::env::Environment;
use crate::identity::RuntimeUser;

/// Command substituted when the caller supplies no arguments at all.
pub const DEFAULT_COMMAND: [&str; 3] = ["python", "-m", "iflow2api"];

/// Environment variable overriding the bind address.
pub const HOST_VAR: &str = "IFLOW2API_HOST";

/// Environment variable overriding the listen port.
pub const PORT_VAR: &str = "IFLOW2API_PORT";

/// Bind address applied when [`HOST_VAR`] is unset or empty.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Listen port applied when [`PORT_VAR`] is unset or empty.
pub const DEFAULT_PORT: &str = "28000";

/// First tokens recognised as an invocation of the service itself.
const SERVICE_TOKENS: [&str; 3] = ["python", "python3", "iflow2api"];

/// Final command line and the identity it is executed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Argument vector handed to exec; the first element is the program.
    pub argv: Vec<OsString>,
    /// Account adopted before exec, when the bootstrapper is privileged.
    pub target: Option<RuntimeUser>,
}

/// Builds the final argument vector from the caller-supplied arguments.
///
/// An empty argument list becomes [`DEFAULT_COMMAND`]. When the first
/// token names the service (or an interpreter used to start it) the
/// `--host` and `--port` flags are appended unless already present; any
/// other command passes through unmodified so arbitrary diagnostics can
/// run in the same container.
pub fn build_argv(args: &[OsString], env: &impl Environment) -> Vec<OsString> {
    let mut argv: Vec<OsString> = if args.is_empty() {
        DEFAULT_COMMAND.iter().map(OsString::from).collect()
    } else {
        args.to_vec()
    };
    let service = argv.first().is_some_and(|first| is_service_invocation(first));
    if service {
        if !has_flag(&argv, "--host") {
            argv.push(OsString::from("--host"));
            argv.push(OsString::from(
                env.non_empty(HOST_VAR)
                    .unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            ));
        }
        if !has_flag(&argv, "--port") {
            argv.push(OsString::from("--port"));
            argv.push(OsString::from(
                env.non_empty(PORT_VAR)
                    .unwrap_or_else(|| DEFAULT_PORT.to_owned()),
            ));
        }
    }
    argv
}

fn is_service_invocation(token: &OsStr) -> bool {
    Path::new(token)
        .file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| SERVICE_TOKENS.contains(&name))
}

fn has_flag(argv: &[OsString], flag: &str) -> bool {
    let assigned = format!("{flag}=");
    argv.iter().skip(1).any(|argument| {
        argument == OsStr::new(flag) || argument.as_bytes().starts_with(assigned.as_bytes())
    })
}

/// Terminal process replacement strategies.
///
/// The production implementation execs; tests substitute a recording
/// implementation because a replaced test process cannot assert anything.
pub trait ProcessImage {
    /// Replaces the current process with the spec; never returns on success.
    fn replace(&self, spec: &LaunchSpec) -> Result<Infallible, LaunchError>;
}

/// Process replacement backed by privilege drop and `execvp`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessImage;

impl ProcessImage for SystemProcessImage {
    fn replace(&self, spec: &LaunchSpec) -> Result<Infallible, LaunchError> {
        if let Some(user) = &spec.target {
            drop_privileges(user)?;
        }
        let argv = to_cstrings(&spec.argv)?;
        let program = argv.first().ok_or(LaunchError::EmptyCommand)?;
        info!(
            target: LAUNCH_TARGET,
            command = %spec.argv.iter().map(|a| a.to_string_lossy().into_owned()).collect::<Vec<_>>().join(" "),
            user = spec.target.as_ref().map(|user| user.name.as_str()),
            "replacing process image"
        );
        execvp(program, &argv).map_err(|source| LaunchError::Exec {
            command: program.to_string_lossy().into_owned(),
            source,
        })
    }
}

fn drop_privileges(user: &RuntimeUser) -> Result<(), LaunchError> {
    setgroups(&[user.gid]).map_err(|source| LaunchError::SetGroups { source })?;
    setgid(user.gid).map_err(|source| LaunchError::SetGid { source })?;
    setuid(user.uid).map_err(|source| LaunchError::SetUid { source })?;
    // Single-threaded process with no other readers of the environment.
    unsafe {
        env::set_var("HOME", &user.home);
        env::set_var("USER", &user.name);
    }
    Ok(())
}

fn to_cstrings(argv: &[OsString]) -> Result<Vec<CString>, LaunchError> {
    argv.iter()
        .map(|argument| {
            CString::new(argument.clone().into_vec()).map_err(|source| LaunchError::BadArgument {
                argument: argument.to_string_lossy().into_owned(),
                source,
            })
        })
        .collect()
}

/// Errors raised while finalising or executing the service command.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The argument vector was empty after finalisation.
    #[error("cannot execute an empty command")]
    EmptyCommand,
    /// An argument contained an interior NUL byte.
    #[error("argument '{argument}' cannot be passed to exec: {source}")]
    BadArgument {
        /// Offending argument, lossily decoded.
        argument: String,
        /// Underlying conversion error.
        #[source]
        source: NulError,
    },
    /// Dropping supplementary groups failed.
    #[error("failed to set supplementary groups: {source}")]
    SetGroups {
        /// Underlying OS error.
        source: Errno,
    },
    /// Adopting the unprivileged group failed.
    #[error("failed to drop group privileges: {source}")]
    SetGid {
        /// Underlying OS error.
        source: Errno,
    },
    /// Adopting the unprivileged user failed.
    #[error("failed to drop user privileges: {source}")]
    SetUid {
        /// Underlying OS error.
        source: Errno,
    },
    /// The exec itself failed; the bootstrapper still exists.
    #[error("failed to execute '{command}': {source}")]
    Exec {
        /// Program that could not be executed.
        command: String,
        /// Underlying OS error.
        source: Errno,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn empty_invocation_gets_default_command_and_flags() {
        let argv = build_argv(&[], &HashMap::new());
        assert_eq!(
            argv,
            os(&[
                "python",
                "-m",
                "iflow2api",
                "--host",
                "0.0.0.0",
                "--port",
                "28000"
            ])
        );
    }

    #[test]
    fn host_and_port_come_from_the_environment() {
        let env = env_of(&[
            ("IFLOW2API_HOST", "127.0.0.1"),
            ("IFLOW2API_PORT", "9000"),
        ]);
        let argv = build_argv(&os(&["python", "-m", "iflow2api"]), &env);
        assert_eq!(
            argv,
            os(&[
                "python",
                "-m",
                "iflow2api",
                "--host",
                "127.0.0.1",
                "--port",
                "9000"
            ])
        );
    }

    #[rstest]
    #[case(&["python", "-m", "iflow2api", "--host", "10.0.0.1"])]
    #[case(&["python", "-m", "iflow2api", "--host=10.0.0.1"])]
    fn caller_supplied_host_is_never_duplicated(#[case] args: &[&str]) {
        let argv = build_argv(&os(args), &HashMap::new());
        let hosts = argv
            .iter()
            .filter(|argument| argument.as_bytes().starts_with(b"--host"))
            .count();
        assert_eq!(hosts, 1);
        // The port is still injected.
        assert!(argv.contains(&OsString::from("--port")));
    }

    #[test]
    fn caller_supplied_port_is_never_duplicated() {
        let argv = build_argv(&os(&["python3", "-m", "iflow2api", "--port", "9000"]), &HashMap::new());
        let ports = argv
            .iter()
            .filter(|argument| argument.as_bytes().starts_with(b"--port"))
            .count();
        assert_eq!(ports, 1);
    }

    #[rstest]
    #[case(&["bash", "-lc", "ls ~/.iflow2api"])]
    #[case(&["env"])]
    #[case(&["/bin/sh", "-c", "id"])]
    fn diagnostic_commands_pass_through_unmodified(#[case] args: &[&str]) {
        let argv = build_argv(&os(args), &HashMap::new());
        assert_eq!(argv, os(args));
    }

    #[rstest]
    #[case("/usr/local/bin/python3")]
    #[case("python")]
    #[case("/usr/bin/iflow2api")]
    fn interpreter_paths_are_recognised(#[case] first: &str) {
        let argv = build_argv(&os(&[first]), &HashMap::new());
        assert!(argv.contains(&OsString::from("--host")));
        assert!(argv.contains(&OsString::from("--port")));
    }

    #[test]
    fn similar_flags_do_not_suppress_injection() {
        let argv = build_argv(&os(&["python", "--hostname", "x"]), &HashMap::new());
        assert!(argv.contains(&OsString::from("--host")));
        assert!(argv.contains(&OsString::from("--port")));
    }

    #[test]
    fn arguments_with_interior_nul_are_rejected() {
        let spec = LaunchSpec {
            argv: vec![OsString::from("python"), OsString::from_vec(b"a\0b".to_vec())],
            target: None,
        };
        let error = SystemProcessImage
            .replace(&spec)
            .expect_err("interior NUL must fail");
        assert!(matches!(error, LaunchError::BadArgument { .. }));
    }
}
