//! Binary entry point for the container bootstrapper.

use std::process::ExitCode;

use tracing::error;

use iflow2api_init::{SystemEnvironment, telemetry};

fn main() -> ExitCode {
    let env = SystemEnvironment;
    if let Err(error) = telemetry::initialise(&env) {
        eprintln!("iflow2api-init: {error}");
        return ExitCode::FAILURE;
    }
    match iflow2api_init::run() {
        Ok(never) => match never {},
        Err(error) => {
            error!(
                error = %error,
                severity = ?error.severity(),
                "bootstrap failed before the service was launched"
            );
            ExitCode::FAILURE
        }
    }
}
