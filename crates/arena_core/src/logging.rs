//! Logging setup for hosts embedding the orchestrator.
//!
//! Initializes the tracing-based logging stack used throughout the library.
//! The filter respects `RUST_LOG` when set, falling back to the level chosen
//! by the `debug` flag.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize structured logging with formatted output.
///
/// The global subscriber can only be installed once per process; a second
/// call returns an error instead of panicking so embedders that already set
/// up tracing themselves are unaffected.
pub fn setup_logging(debug: bool) -> Result<(), TryInitError> {
    setup_logging_with_format(debug, false)
}

/// Initialize logging, optionally with JSON output for log aggregation
/// systems.
pub fn setup_logging_with_format(debug: bool, json_format: bool) -> Result<(), TryInitError> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
    }
}
