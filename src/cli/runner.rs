//! Command dispatcher: one pass from parsed options to a result line and exit code.
//!
//! Idle -> Configuring -> Executing -> Terminal. Help and unknown commands end
//! before any engine is constructed; everything else goes through
//! INIT, DATABASE_CREATED, the applier's three setup markers and `<COMMAND>_START`.

use super::args::parse;
use super::util::write_usage;
use crate::applier;
use crate::config::AppConfig;
use crate::engine::{EngineSink, RepairEngine, SqliteDatabase, TraceEvent};
use crate::errors::EngineError;
use crate::options::{Command, Options};
use crate::progress::ProgressReporter;
use crate::protocol::{Console, ResultLine};
use log::{debug, info, warn};
use std::io::Write;
use std::path::Path;

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Success, or `check` found no corruption.
    Success = 0,
    /// The operation failed, corruption was found, or repair scored zero.
    Failure = 1,
    /// Bad arguments or unknown command.
    Usage = 2,
}

impl ExitCode {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    fn from_ok(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Failure }
    }
}

/// Forwards engine callbacks to the console; owned by one run.
struct RunSink<'c, 'w> {
    console: &'c mut Console<'w>,
    reporter: ProgressReporter,
}

impl EngineSink for RunSink<'_, '_> {
    fn on_progress(&mut self, fraction: f64, increment: f64) -> bool {
        self.reporter.on_progress(fraction, increment, self.console)
    }

    fn on_trace_event(&mut self, event: &TraceEvent<'_>) {
        self.console.sql(event);
    }
}

/// Parse `argv`, run the command against SQLite with default configuration.
pub fn run<S: AsRef<str>>(argv: &[S], out: &mut dyn Write, err: &mut dyn Write) -> ExitCode {
    run_with_config(argv, &AppConfig::default(), out, err)
}

pub fn run_with_config<S: AsRef<str>>(
    argv: &[S],
    config: &AppConfig,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> ExitCode {
    let mut console = Console::new(out);
    let opts = match parse(argv) {
        Ok(opts) => opts,
        Err(e) => {
            warn!(target: "dbrepair::cli", "argument error: {e}");
            console.result(&ResultLine::new(Command::Invalid(String::new()).name()).error(&e));
            let _ = writeln!(err, "error: {e}\n");
            write_usage(err);
            return ExitCode::Usage;
        }
    };
    debug!(
        target: "dbrepair::cli",
        "command {} on {} (engine: {})",
        opts.command.name(),
        opts.target_path.display(),
        opts.command.needs_engine()
    );
    let tag = config.trace_tag();
    dispatch(&opts, |path| SqliteDatabase::new(path).with_tag(tag), &mut console, err)
}

/// Run already-parsed options. `open` constructs the engine and is only
/// called for commands that need one.
pub fn dispatch<E, F>(opts: &Options, open: F, console: &mut Console<'_>, err: &mut dyn Write) -> ExitCode
where
    E: RepairEngine,
    F: FnOnce(&Path) -> E,
{
    match &opts.command {
        Command::Help => {
            write_usage(err);
            console.result(&ResultLine::new(opts.command.name()));
            ExitCode::Success
        }
        Command::Invalid(word) => {
            warn!(target: "dbrepair::cli", "unknown command {word:?}");
            console.result(&ResultLine::new(opts.command.name()).error(format_args!("unknown command: {word}")));
            let _ = writeln!(err, "error: unknown command: {word}\n");
            write_usage(err);
            ExitCode::Usage
        }
        Command::Check => session(opts, open, console, |db, sink| match db.check_if_corrupted(sink) {
            Ok(corrupted) => (
                ResultLine::new("check").field("corrupted", corrupted),
                ExitCode::from_ok(!corrupted),
            ),
            Err(e) => (
                ResultLine::new("check").field("corrupted", "unknown").error(e),
                ExitCode::Failure,
            ),
        }),
        Command::Backup => session(opts, open, console, |db, sink| {
            ok_result("backup", db.backup(sink))
        }),
        Command::Deposit => session(opts, open, console, |db, sink| {
            ok_result("deposit", db.deposit(sink))
        }),
        Command::ContainsDeposited => session(opts, open, console, |db, _| {
            match db.contains_deposited() {
                Ok(present) => (
                    ResultLine::new("contains-deposited").field("present", present),
                    ExitCode::from_ok(present),
                ),
                Err(e) => (
                    ResultLine::new("contains-deposited").field("present", false).error(e),
                    ExitCode::Failure,
                ),
            }
        }),
        Command::RemoveDeposited => session(opts, open, console, |db, _| {
            ok_result("remove-deposited", db.remove_deposited())
        }),
        Command::Repair => session(opts, open, console, |db, sink| {
            let outcome = db.retrieve(sink);
            sink.console.state("REPAIR_DONE");
            match outcome {
                Ok(score) => {
                    let ok = score > 0.0;
                    (
                        ResultLine::new("repair").field("score", format_args!("{score:.6}")).field("ok", ok),
                        ExitCode::from_ok(ok),
                    )
                }
                Err(e) => (
                    ResultLine::new("repair").field("score", format_args!("{:.6}", 0.0)).field("ok", false).error(e),
                    ExitCode::Failure,
                ),
            }
        }),
    }
}

fn ok_result(command: &str, outcome: Result<(), EngineError>) -> (ResultLine, ExitCode) {
    match outcome {
        Ok(()) => (ResultLine::new(command).field("ok", true), ExitCode::Success),
        Err(e) => (ResultLine::new(command).field("ok", false).error(e), ExitCode::Failure),
    }
}

/// Construct and configure the engine, run `op`, write its result line.
fn session<E, F, Op>(opts: &Options, open: F, console: &mut Console<'_>, op: Op) -> ExitCode
where
    E: RepairEngine,
    F: FnOnce(&Path) -> E,
    Op: FnOnce(&mut E, &mut RunSink<'_, '_>) -> (ResultLine, ExitCode),
{
    console.state_detail("INIT", opts.command.name());
    let mut engine = open(&opts.target_path);
    console.state_detail("DATABASE_CREATED", opts.target_path.display());

    let report = applier::apply(&mut engine, opts, console);
    if !report.all_ok() {
        info!(target: "dbrepair::cli", "continuing with incomplete configuration");
    }

    console.state(&format!("{}_START", opts.command.state_name()));
    let (result, code) = {
        let mut sink = RunSink { console: &mut *console, reporter: ProgressReporter::new(opts.show_progress) };
        op(&mut engine, &mut sink)
    };
    info!(target: "dbrepair::cli", "{} finished with exit code {}", result.command(), code.code());
    console.result(&result);
    code
}
