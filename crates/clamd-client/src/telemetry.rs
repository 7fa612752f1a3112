//! Structured telemetry initialisation for applications embedding the client.
//!
//! The client only emits `tracing` events; installing a subscriber is left to
//! the host application. [`initialise`] is a convenience for hosts that have
//! no subscriber of their own.

use std::borrow::Cow;
use std::io::{self, IsTerminal};

use clamd_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Root tracing target shared by every client module.
const CLIENT_ROOT_TARGET: &str = "clamd_client";

/// Level applied to other crates when the configured filter is a bare level.
const HOST_DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

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
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// A bare level such as `debug` applies to the client's own events only;
/// everything else stays at `warn`. Full directive expressions are used as
/// written.
///
/// Repeated calls are idempotent: only the first installs the subscriber, and
/// later calls return a fresh [`TelemetryHandle`] without touching global
/// state. A first call that fails may be retried.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

/// Expands a bare level into directives scoped to the client's targets.
fn scoped_directives(filter: &str) -> Cow<'_, str> {
    match filter.trim().parse::<LevelFilter>() {
        Ok(level) => Cow::Owned(format!(
            "{HOST_DEFAULT_LEVEL},{CLIENT_ROOT_TARGET}={level}"
        )),
        Err(_) => Cow::Borrowed(filter),
    }
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let directives = scoped_directives(config.log_filter());
    let filter = EnvFilter::try_new(directives.as_ref())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            // Reply readers and release tasks run on named threads.
            .with_thread_names(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    tracing::debug!(
        target: CLIENT_ROOT_TARGET,
        filter = %directives,
        format = %config.log_format(),
        "telemetry initialised"
    );
    Ok(())
}
