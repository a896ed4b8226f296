//! Concrete output sinks: `ConsoleStatus` (colored unicode-bullet printer)
//! implementing `crun_oci::log::StatusSink`, and a `tracing`-backed
//! `EventLog` implementation.

use anyhow::Context as _;
use colored::Colorize as _;
use crun_oci::log::{EventLog as EventLogTrait, Field, StatusSink};

use crate::config::{LogFormat, LogLevel};

/// Prints human progress to stderr with colored unicode bullets, mirroring
/// `internal/log/status.go`'s `Console` (•/→/✔/⚠/✖).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleStatus;

fn render_fields(fields: &[Field<'_>]) -> String {
    if fields.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!(" ({})", rendered.join(", "))
}

impl StatusSink for ConsoleStatus {
    fn status(&self, message: &str, fields: &[Field<'_>]) {
        println!("{} {message}{}", "•".blue(), render_fields(fields));
    }

    fn step(&self, message: &str, fields: &[Field<'_>]) {
        println!("{} {message}{}", "→".cyan(), render_fields(fields));
    }

    fn success(&self, message: &str, fields: &[Field<'_>]) {
        println!("{} {message}{}", "✔".green(), render_fields(fields));
    }

    fn warn(&self, message: &str, fields: &[Field<'_>]) {
        println!("{} {message}{}", "⚠".yellow(), render_fields(fields));
    }

    fn error(&self, message: &str, fields: &[Field<'_>]) {
        eprintln!("{} {message}{}", "✖".red(), render_fields(fields));
    }
}

/// A `tracing`-backed [`EventLogTrait`] implementation: each call emits one
/// `tracing` event at the matching level, with fields attached as a
/// formatted suffix (the `tracing-subscriber` layer installed in `main`
/// decides whether that ends up as JSON or text).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLog;

impl EventLogTrait for TracingEventLog {
    fn debug(&self, message: &str, fields: &[Field<'_>]) {
        tracing::debug!(fields = %render_fields(fields), "{message}");
    }

    fn info(&self, message: &str, fields: &[Field<'_>]) {
        tracing::info!(fields = %render_fields(fields), "{message}");
    }

    fn warn(&self, message: &str, fields: &[Field<'_>]) {
        tracing::warn!(fields = %render_fields(fields), "{message}");
    }

    fn error(&self, message: &str, fields: &[Field<'_>]) {
        tracing::error!(fields = %render_fields(fields), "{message}");
    }
}

/// Installs the global `tracing` subscriber, writing to `app_log_dir` in
/// the configured format and at the configured minimum level. Matches
/// `internal/log/logger.go`'s `BuildLogOptions`/`GetLogOptions`.
pub fn init_tracing(app_log_dir: &std::path::Path, level: LogLevel, format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::prelude::*;

    std::fs::create_dir_all(app_log_dir)?;
    let file = tracing_appender_file(app_log_dir)?;
    let filter = EnvFilter::try_new(level_filter(level))?;

    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file));
    let layer = if matches!(format, LogFormat::Json) {
        layer.json().boxed()
    } else {
        layer.boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .context("installing the tracing subscriber")?;
    Ok(())
}

fn level_filter(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// Opens (creating if absent) `app_log_dir/crun.log` for append, as the
/// destination for the structured event log.
fn tracing_appender_file(app_log_dir: &std::path::Path) -> anyhow::Result<std::fs::File> {
    let path = app_log_dir.join("crun.log");
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}
