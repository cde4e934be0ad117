//! Structured telemetry initialisation for the bootstrapper.

use std::io::{self, IsTerminal};
use std::str::FromStr;

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::env::Environment;
use crate::logging::LogFormat;

/// Environment variable selecting the log filter expression.
pub const LOG_FILTER_VAR: &str = "IFLOW2API_LOG";

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_VAR: &str = "IFLOW2API_LOG_FORMAT";

/// Default log filter applied when [`LOG_FILTER_VAR`] is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to parse the configured log format.
    #[error("invalid log format '{0}'")]
    Format(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: the first invocation installs the global
/// subscriber and subsequent invocations return a fresh [`TelemetryHandle`]
/// without touching the global state again.
pub fn initialise(env: &impl Environment) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(env))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(env: &impl Environment) -> Result<(), TelemetryError> {
    let expression = env
        .non_empty(LOG_FILTER_VAR)
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());
    let filter =
        EnvFilter::try_new(&expression).map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let format = match env.non_empty(LOG_FORMAT_VAR) {
        Some(raw) => LogFormat::from_str(&raw).map_err(|_| TelemetryError::Format(raw))?,
        None => LogFormat::default(),
    };

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            // Avoid stray colour codes in non-TTY sinks while keeping colour on
            // interactive terminals.
            .with_ansi(io::stderr().is_terminal())
            // Add a timestamp so operators can correlate startup activity.
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => {
            let json_builder = builder(filter).json();
            let json = json_builder.flatten_event(true).finish();
            Box::new(json)
        }
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
