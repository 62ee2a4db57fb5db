//! Command-line surface: argument grammar, usage text and the dispatcher.
pub mod args;
pub mod runner;
pub mod util;

pub use args::parse;
pub use runner::{ExitCode, run, run_with_config};
