//! The database engine as seen by the orchestration layer.
//!
//! [`RepairEngine`] is the seam between argument handling and the storage
//! engine. Operations take the caller's [`EngineSink`] by reference; the
//! engine keeps no callback registry of its own.

pub mod salvage;
pub mod sqlite;

use crate::errors::EngineError;
use crate::options::CipherVersion;
use std::path::Path;

pub use sqlite::SqliteDatabase;

/// Ordering value for [`ConnectionConfig`]; lower runs earlier.
pub type Priority = i32;

pub const PRIORITY_HIGHEST: Priority = Priority::MIN;

/// Statement-level tracing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraceMode {
    #[default]
    Disabled,
    /// SQL text only.
    Short,
    /// SQL text plus per-statement info.
    Full,
}

impl TraceMode {
    #[must_use]
    pub fn from_flags(enabled: bool, full: bool) -> Self {
        match (enabled, full) {
            (false, _) => Self::Disabled,
            (true, false) => Self::Short,
            (true, true) => Self::Full,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Short => "short",
            Self::Full => "full",
        }
    }
}

/// One executed statement.
#[derive(Debug, Clone, Copy)]
pub struct TraceEvent<'a> {
    pub tag: i64,
    /// Identifier of the connection that ran the statement.
    pub handle: &'a str,
    pub path: &'a Path,
    pub sql: &'a str,
    /// Only populated in [`TraceMode::Full`].
    pub info: Option<&'a str>,
}

/// Receiver for everything an engine operation reports while it runs.
pub trait EngineSink {
    /// Progress of a long-running operation. Returning `false` asks the engine to stop.
    fn on_progress(&mut self, fraction: f64, increment: f64) -> bool;

    fn on_trace_event(&mut self, event: &TraceEvent<'_>);
}

/// Sink that drops everything and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EngineSink for NullSink {
    fn on_progress(&mut self, _fraction: f64, _increment: f64) -> bool {
        true
    }

    fn on_trace_event(&mut self, _event: &TraceEvent<'_>) {}
}

/// Statements run against every new connection, before the cipher key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub name: String,
    pub priority: Priority,
    pub statements: Vec<String>,
}

/// Maintenance surface of an engine bound to one database path.
pub trait RepairEngine {
    fn path(&self) -> &Path;

    fn set_sql_trace(&mut self, mode: TraceMode);

    /// Register (or replace, by name) a connection config.
    fn set_config(&mut self, config: ConnectionConfig) -> Result<(), EngineError>;

    fn set_cipher_key(
        &mut self,
        key: &[u8],
        page_size: u32,
        version: CipherVersion,
    ) -> Result<(), EngineError>;

    fn check_if_corrupted(&mut self, sink: &mut dyn EngineSink) -> Result<bool, EngineError>;

    fn backup(&mut self, sink: &mut dyn EngineSink) -> Result<(), EngineError>;

    fn deposit(&mut self, sink: &mut dyn EngineSink) -> Result<(), EngineError>;

    fn contains_deposited(&self) -> Result<bool, EngineError>;

    fn remove_deposited(&mut self) -> Result<(), EngineError>;

    /// Rebuild the database from whatever is still readable. Returns a score in `[0, 1]`.
    fn retrieve(&mut self, sink: &mut dyn EngineSink) -> Result<f64, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_mode_from_flags() {
        assert_eq!(TraceMode::from_flags(false, true), TraceMode::Disabled);
        assert_eq!(TraceMode::from_flags(true, false), TraceMode::Short);
        assert_eq!(TraceMode::from_flags(true, true), TraceMode::Full);
        assert_eq!(TraceMode::Full.as_str(), "full");
    }

    #[test]
    fn priorities_order_highest_first() {
        let mut v = vec![0, PRIORITY_HIGHEST, 10];
        v.sort();
        assert_eq!(v[0], PRIORITY_HIGHEST);
    }
}
