//! Logging setup utilities for the Parole binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are enabled by the default filter.
const PAROLE_CRATES: [&str; 2] = ["parole_server", "parole_shared"];

/// Build the default filter directive used when `RUST_LOG` is not set.
///
/// The directive enables `default_log_level` for every Parole crate and for the
/// binary itself, e.g. `parole_server=info,parole_shared=info,parole_server=info`.
pub fn default_directive(binary_name: &str, default_log_level: &str) -> String {
    PAROLE_CRATES
        .iter()
        .copied()
        .chain(std::iter::once(binary_name))
        .map(|target| format!("{}={}", target.replace('-', "_"), default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "parole-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use parole_shared::logger::setup_logger;
///
/// setup_logger("parole-server", "debug");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!(binary = binary_name, default_log_level, "Logger initialized");
}
