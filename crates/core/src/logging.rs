//! Structured logging infrastructure for the Ausweis flow.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration. Logs go to
//! stderr so that tool output on stdout stays machine-readable.

use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` if set, otherwise [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging system with structured output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use ausweis_core::logging;
///
/// logging::init();
/// tracing::info!("Replay started");
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();
}

/// Initialize the logging system with JSON output.
///
/// Intended for hosts that ship logs to an aggregator. Log level can be
/// configured via the `RUST_LOG` environment variable.
///
/// # Example
/// ```no_run
/// use ausweis_core::logging;
///
/// logging::init_json();
/// tracing::info!(workflow = "AUTH", "Flow started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();
}

/// Pick [`init`] or [`init_json`] by name; anything but `"json"` means plain text.
pub fn init_with_format(format: &str) {
    if format.eq_ignore_ascii_case("json") {
        init_json();
    } else {
        init();
    }
}
