use std::path::PathBuf;
use thiserror::Error;

/// Malformed or missing command-line input. Always recovered locally: the
/// runner prints usage and exits with code 2.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid hex character {c:?} at position {index}")]
    InvalidHexCharacter { c: char, index: usize },

    #[error("hex string has an odd number of digits")]
    OddLength,

    #[error("missing command")]
    MissingCommand,

    #[error("missing database path")]
    MissingPath,

    #[error("database path is empty")]
    EmptyPath,

    #[error("flag {0} requires a value")]
    MissingValue(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("invalid integer for {flag}: {value:?}")]
    InvalidInteger { flag: String, value: String },

    #[error("invalid cipher version: {0:?} (expected default|1|2|3|4)")]
    InvalidCipherVersion(String),

    /// Any other rejection from the command-line parser, with its message.
    #[error("{0}")]
    Rejected(String),
}

/// Failures raised by the database engine adapter.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persist error: {0}")]
    Persist(#[from] tempfile::PathPersistError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database not found: {}", .0.display())]
    NotFound(PathBuf),
}
