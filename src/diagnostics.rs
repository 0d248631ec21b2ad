//! Caller-supplied diagnostic sink
//!
//! The engine never logs on its own. Every observation it wants to surface is
//! handed to a [`DiagnosticSink`] passed in by the caller; [`TracingSink`]
//! forwards them to `tracing` and [`NoopSink`] drops them.

use std::fmt;

use tracing::{debug, warn};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Warn,
}

/// A single observation emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

impl Diagnostic {
    pub fn debug(message: impl Into<String>) -> Self {
        Self {
            level: Level::Debug,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: Level::Warn,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives engine diagnostics; shared with hook callbacks, so must be thread-safe
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: Diagnostic) {
        match diagnostic.level {
            Level::Debug => debug!(target: "storage_rent_scraper", "{}", diagnostic.message),
            Level::Warn => warn!(target: "storage_rent_scraper", "{}", diagnostic.message),
        }
    }
}

/// Discards every diagnostic
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn record(&self, _diagnostic: Diagnostic) {}
}
