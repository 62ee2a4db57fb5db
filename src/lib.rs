//! Maintenance front end for SQLite/SQLCipher databases: corruption check,
//! backup, deposit and repair, driven by a line-oriented console protocol.
//!
//! The binary is a thin wrapper around [`cli::run_with_config`]; everything
//! it does is reachable from the library for testing.

pub mod applier;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fsutil;
pub mod hexcodec;
pub mod logger;
pub mod options;
pub mod progress;
pub mod protocol;

pub use cli::{ExitCode, run, run_with_config};
pub use config::AppConfig;
pub use engine::{EngineSink, RepairEngine, SqliteDatabase};
pub use errors::{EngineError, ParseError};
pub use options::{CipherKey, CipherVersion, Command, Options};
