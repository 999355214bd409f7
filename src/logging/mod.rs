//! Logging infrastructure - structured tracing across the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels via environment
//! - Zero-cost when disabled
//! - Console (human or JSON) or file output
//!
//! Every failure at the dispatch boundary is reported here instead of being
//! propagated into the foreign runtime.

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path (console when `None`)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // NRNBRIDGE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("NRNBRIDGE_LOG_LEVEL") {
            config.level = parse_level(&level_str).unwrap_or(Level::INFO);
        }

        // NRNBRIDGE_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("NRNBRIDGE_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("NRNBRIDGE_LOG_JSON").is_ok();
        config.show_spans = std::env::var("NRNBRIDGE_LOG_SPANS").is_ok();

        config
    }

    /// Create debug config (verbose logging)
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }
}

/// Parse a textual level name, case-insensitive
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber; later calls are no-ops, and a
/// subscriber installed by the embedding application takes precedence.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("nrnbridge={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = match (&config.log_path, config.json_format) {
            (Some(path), _) => {
                let path = Path::new(path);
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                let file = path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "nrnbridge.log".to_string());
                fmt::layer()
                    .with_writer(tracing_appender::rolling::never(dir, file))
                    .with_ansi(false)
                    .with_span_events(span_events)
                    .with_target(true)
                    .boxed()
            }
            (None, true) => fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(span_events)
                .boxed(),
            (None, false) => fmt::layer()
                .with_writer(io::stderr)
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
                .boxed(),
        };

        // Ignore error if the host application already installed one
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log a successful class registration
pub fn log_registration(class: &str, id: usize, constructors: usize, methods: usize) {
    info!(
        event = "class_registered",
        class = class,
        id = id,
        constructors = constructors,
        methods = methods,
        "Host class registered"
    );
}

/// Log a class that could not be registered
pub fn log_registration_error(class: &str, error: &str) {
    error!(
        event = "registration_failed",
        class = class,
        error = error,
        "Class registration aborted"
    );
}

/// Log a member skipped during registration
#[inline]
pub fn log_member_skipped(class: &str, member: &str, reason: &str) {
    debug!(
        event = "member_skipped",
        class = class,
        member = member,
        reason = reason,
        "Member not exposed to the foreign runtime"
    );
}

/// Log an overload pair that the foreign side cannot tell apart
pub fn log_overload_collision(class: &str, member: &str, foreign: &str, kept: &str, shadowed: &str) {
    warn!(
        event = "overload_collision",
        class = class,
        member = member,
        foreign_signature = foreign,
        kept = kept,
        shadowed = shadowed,
        "Overloads collapse to the same foreign signature; first registered wins"
    );
}

/// Log a dispatched call
#[inline]
pub fn log_dispatch(class: &str, member: &str, arg_count: usize) {
    trace!(
        event = "dispatch",
        class = class,
        member = member,
        args = arg_count,
        "Dispatching call"
    );
}

/// Log a call that failed at the boundary
pub fn log_call_failure(class: &str, member: &str, error: &str) {
    error!(
        event = "call_failed",
        class = class,
        member = member,
        error = error,
        "Call failed; returning sentinel to foreign runtime"
    );
}

/// Log a foreign reference acquired by a wrapper
#[inline]
pub fn log_encapsulate(pointer: u64, tag: u8) {
    trace!(
        event = "encapsulate",
        pointer = pointer,
        tag = tag,
        "Foreign object wrapped"
    );
}

/// Log a foreign reference released by a wrapper
#[inline]
pub fn log_release(pointer: u64) {
    trace!(
        event = "release",
        pointer = pointer,
        "Foreign reference released"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.log_path.is_none());

        let debug_config = LogConfig::debug();
        assert_eq!(debug_config.level, Level::TRACE);
        assert!(debug_config.show_spans);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_init_idempotent() {
        init();
        init(); // Should not panic
        assert!(is_initialized());
    }
}
