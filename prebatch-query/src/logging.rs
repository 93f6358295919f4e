//! Logging infrastructure for Prebatch.
//!
//! Structured logging controlled by the `PREBATCH_DEBUG` environment variable.
//!
//! # Environment Variables
//!
//! - `PREBATCH_DEBUG=true` - Enable debug logging
//! - `PREBATCH_DEBUG=1` - Enable debug logging
//! - `PREBATCH_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `PREBATCH_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! # Usage
//!
//! ```rust,no_run
//! use prebatch_query::logging;
//!
//! // Call once at startup
//! logging::init();
//! ```
//!
//! Without the `tracing-subscriber` feature, `init` installs nothing and the
//! crate's `tracing` events go to whatever subscriber the application set up.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `PREBATCH_DEBUG`.
///
/// Returns `true` if `PREBATCH_DEBUG` is set to "true", "1", or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("PREBATCH_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `PREBATCH_LOG_LEVEL`.
///
/// Defaults to "debug" if `PREBATCH_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("PREBATCH_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `PREBATCH_LOG_FORMAT`.
///
/// Defaults to "json".
pub fn get_log_format() -> &'static str {
    env::var("PREBATCH_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize the Prebatch logging system.
///
/// Subsequent calls are no-ops. Nothing is installed unless `PREBATCH_DEBUG`
/// or `PREBATCH_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("PREBATCH_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!("prebatch={},prebatch_query={}", level, level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            // Another subscriber may already be installed; keep it.
            let installed = match get_log_format() {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "Prebatch logging initialized"
                );
            }
        }
    });
}

/// Log at debug level only when `PREBATCH_DEBUG` is enabled.
#[macro_export]
macro_rules! prebatch_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // SAFETY: no other test in this crate touches these variables.
        unsafe {
            env::remove_var("PREBATCH_DEBUG");
            env::remove_var("PREBATCH_LOG_LEVEL");
            env::remove_var("PREBATCH_LOG_FORMAT");
        }
        assert!(!is_debug_enabled());
        assert_eq!(get_log_level(), "warn");
        assert_eq!(get_log_format(), "json");
    }
}
