//! # Logging Utilities
//!
//! Logging setup for argscope binaries, built on `tracing`.
//!
//! Query results go to stdout, so console logs are written to stderr.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use argscope_utils::init_logging;
//!
//! // Reads RUST_LOG, ARGSCOPE_LOG_FORMAT and ARGSCOPE_LOG_FILE
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log filter (e.g. `RUST_LOG=debug`, `RUST_LOG=argscope_core=trace`)
//! - `ARGSCOPE_LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `ARGSCOPE_LOG_FILE`: Optional log file, written in addition to stderr

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const LOG_FORMAT_VAR: &str = "ARGSCOPE_LOG_FORMAT";
const LOG_FILE_VAR: &str = "ARGSCOPE_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Human-readable (default)
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    /// Most verbose; shows each resolution step
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Initialize logging from the environment
///
/// - `RUST_LOG`: Log filter, default `warn`
/// - `ARGSCOPE_LOG_FORMAT`: `json` or `pretty`
/// - `ARGSCOPE_LOG_FILE`: Optional path to an additional log file
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var(LOG_FORMAT_VAR)
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty);

    let directives = env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| Level::WARN.to_string());
    let log_file = env::var(LOG_FILE_VAR).ok().map(PathBuf::from);
    init_subscriber(format, &directives, log_file.as_deref())
}

/// Initialize logging with an explicit level and format
///
/// The level overrides `RUST_LOG`; `ARGSCOPE_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    let directives = Level::from(level).to_string();
    let log_file = env::var(LOG_FILE_VAR).ok().map(PathBuf::from);
    init_subscriber(format, &directives, log_file.as_deref())
}

/// Log to a dated file in `dir` as well as stderr
///
/// The file is named `YYYY-MM-DD-argscope.log`. Returns its path.
///
/// ## Errors
///
/// Returns an error if `dir` cannot be created or a global subscriber is
/// already installed.
pub fn init_logging_to_dir(level: LogLevel, format: LogFormat, dir: &Path) -> Result<PathBuf, LoggingError>
{
    std::fs::create_dir_all(dir)?;
    let log_file = dated_log_file(dir);
    let directives = Level::from(level).to_string();
    init_subscriber(format, &directives, Some(&log_file))?;
    Ok(log_file)
}

fn dated_log_file(dir: &Path) -> PathBuf
{
    let today = Utc::now().format("%Y-%m-%d");
    dir.join(format!("{today}-argscope.log"))
}

/// Malformed directives fall back to `warn` rather than failing startup.
fn filter(directives: &str) -> EnvFilter
{
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string()))
}

fn init_subscriber(format: LogFormat, directives: &str, log_file: Option<&Path>) -> Result<(), LoggingError>
{
    let file_writer = log_file.map(|path| {
        let file_appender = tracing_appender::rolling::never(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name().unwrap_or_default(),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The process logs until exit; keep the writer thread alive.
        std::mem::forget(guard);
        non_blocking
    });

    let result = match format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stderr)
                .with_filter(filter(directives));
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_filter(filter(directives))
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(io::stderr)
                .with_filter(filter(directives));
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_filter(filter(directives))
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
    };

    result.map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// A global subscriber was already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// The log directory or file could not be created
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
