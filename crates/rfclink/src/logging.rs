//! # Log Sinks
//!
//! A connection reports what it does through an injected `LogSink` rather than
//! a process-wide logger. Every remote API call is reported once with a
//! structured `meta` object naming the call and, on failure, the error key and
//! return code.
//!
//! Internally the crate also emits `tracing` events; `TracingSink` routes the
//! sink stream into the same subscriber.

use serde::Serialize;
use serde_json::Value as Json;

/// Severity of a sink message, from chattiest to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Silly,
    Debug,
    Verbose,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Silly => "silly",
            Level::Debug => "debug",
            Level::Verbose => "verbose",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

/// Receives structured log messages from a connection.
///
/// Implementations must return promptly; the caller does not wait on delivery.
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, level: Level, message: &str, meta: Option<&Json>);
}

/// Discards everything. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn log(&self, _level: Level, _message: &str, _meta: Option<&Json>) {}
}

/// Forwards sink messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str, meta: Option<&Json>) {
        let meta = meta.map(|m| m.to_string()).unwrap_or_default();
        match level {
            Level::Silly => tracing::trace!(meta = %meta, "{}", message),
            Level::Debug | Level::Verbose => tracing::debug!(meta = %meta, "{}", message),
            Level::Info => tracing::info!(meta = %meta, "{}", message),
            Level::Warn => tracing::warn!(meta = %meta, "{}", message),
            Level::Error => tracing::error!(meta = %meta, "{}", message),
        }
    }
}

/// The `meta` object attached to an API call report.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CallMeta<'a> {
    pub call: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
}

impl<'a> CallMeta<'a> {
    pub fn new(call: &'a str) -> Self {
        Self { call, name: None, key: None, code: None }
    }

    pub fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn failed(mut self, info: &'a rfcwire::ErrorInfo) -> Self {
        self.key = Some(&info.key);
        self.code = Some(info.code as u32);
        self
    }

    pub fn emit(&self, sink: &dyn LogSink) {
        let (level, message) = match self.key {
            Some(_) => (Level::Warn, "RFC API call failed"),
            None => (Level::Debug, "RFC API call"),
        };
        match serde_json::to_value(self) {
            Ok(meta) => sink.log(level, message, Some(&meta)),
            Err(_) => sink.log(level, message, None),
        }
    }
}
