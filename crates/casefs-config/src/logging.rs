//! Structured logging for casefs components.
//!
//! Every event carries a `component` field so a single log stream can be
//! filtered per subsystem. Field values are recorded with their `Display`
//! form.
//!
//! # Usage
//!
//! ```ignore
//! use casefs_config::{log_resolve_info, log_fuse_debug};
//!
//! log_resolve_info!("match found", requested = "docs/a.txt", matched = "Docs/A.txt");
//! log_fuse_debug!("lookup", parent = 1, name = "Docs");
//! ```

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const RESOLVE: &'static str = "RESOLVE";
    pub const REPORT: &'static str = "REPORT";
    pub const FUSE: &'static str = "FUSE";
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
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

// === RESOLVE logging macros ===

#[macro_export]
macro_rules! log_resolve_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "RESOLVE", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_resolve_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "RESOLVE", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_resolve_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "RESOLVE", $($key = %$value,)* $msg)
    };
}

// === REPORT logging macros ===

#[macro_export]
macro_rules! log_report_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "REPORT", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_report_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "REPORT", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_report_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "REPORT", $($key = %$value,)* $msg)
    };
}

// === FUSE logging macros ===

#[macro_export]
macro_rules! log_fuse_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "FUSE", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_fuse_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "FUSE", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_fuse_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "FUSE", $($key = %$value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "CLI", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "CLI", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CLI", $($key = %$value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "CLI", $($key = %$value,)* $msg)
    };
}

/// Build the filter: `CASEFS_LOG`, then `RUST_LOG`, then `level`.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env("CASEFS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// With `file` set, events are appended to that file (no ANSI colors);
/// otherwise they go to stderr.
pub fn init_logging(level: LogLevel, file: Option<&Path>) -> io::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false);

    match file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}
