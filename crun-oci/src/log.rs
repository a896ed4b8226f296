//! The two output-sink capability traits the core speaks to: a human
//! status printer and a structured, leveled event log. Neither core
//! operation is bound to a concrete sink; the CLI crate supplies
//! `ConsoleStatus` and a `tracing`-backed `EventLog` implementation.

use std::fmt::Display;

/// A single structured key-value field attached to a status or log line.
pub type Field<'a> = (&'a str, &'a dyn Display);

/// Human progress reporting, mirroring `internal/log/status.go`'s `Console`
/// methods (Status/Step/Success/Warn/Error).
pub trait StatusSink {
    /// A neutral top-level status line, e.g. `"pulling nginx:1-alpine-perl"`.
    fn status(&self, message: &str, fields: &[Field<'_>]);
    /// A single step within a longer operation.
    fn step(&self, message: &str, fields: &[Field<'_>]);
    /// A completed operation.
    fn success(&self, message: &str, fields: &[Field<'_>]);
    /// A recovered condition worth surfacing but not failing on.
    fn warn(&self, message: &str, fields: &[Field<'_>]);
    /// An unrecoverable failure, reported just before the process exits
    /// nonzero.
    fn error(&self, message: &str, fields: &[Field<'_>]);
}

/// Structured leveled logging, mirroring `internal/log/logger.go`'s use of
/// `log/slog`.
pub trait EventLog {
    /// Fine-grained diagnostic detail, off by default.
    fn debug(&self, message: &str, fields: &[Field<'_>]);
    /// Normal operational events.
    fn info(&self, message: &str, fields: &[Field<'_>]);
    /// A recovered or noteworthy condition.
    fn warn(&self, message: &str, fields: &[Field<'_>]);
    /// An error event, logged alongside (not instead of) the status sink's
    /// `error` line.
    fn error(&self, message: &str, fields: &[Field<'_>]);
}

/// A [`StatusSink`]/[`EventLog`] pair that discards everything, for library
/// callers and tests with nothing to report to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl StatusSink for Silent {
    fn status(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn step(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn success(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn warn(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn error(&self, _message: &str, _fields: &[Field<'_>]) {}
}

impl EventLog for Silent {
    fn debug(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn info(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn warn(&self, _message: &str, _fields: &[Field<'_>]) {}
    fn error(&self, _message: &str, _fields: &[Field<'_>]) {}
}
