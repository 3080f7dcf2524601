//! Structured logging utilities for the inventory cache.
//!
//! Provides consistent logging with component prefixes and structured fields.
//! Output goes to stderr: stdout belongs to the inventory JSON consumed by the
//! automation runtime.
//!
//! # Usage
//!
//! ```ignore
//! use invcache_config::logging::*;
//!
//! log_cache_info!("Host added", hostname = "web1");
//! log_cli_debug!("Reading hostvars", format = "yaml");
//! ```

/// Component identifiers for log filtering, attached as the `component` field
pub struct Component;

impl Component {
    pub const CACHE: &'static str = "CACHE";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse a config level string; unknown values fall back to `Warn`
    pub fn parse(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }
}

// === CACHE logging macros ===

#[macro_export]
macro_rules! log_cache_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::CACHE, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cache_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::CACHE, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cache_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CACHE, $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `INVCACHE_LOG` wins over `RUST_LOG`, which wins over `level`.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("INVCACHE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
