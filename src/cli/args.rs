//! Argument grammar: `argv` to [`Options`], fail-closed.
//!
//! A single malformed flag rejects the whole invocation. Cipher parameters
//! that are guessed or silently dropped could make a healthy encrypted
//! database look corrupted, so there is no partial result.

use super::util::MAX_FLAG_INTEGER;
use crate::errors::ParseError;
use crate::hexcodec;
use crate::options::{CipherKey, CipherVersion, Command, Options};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::error::Error as _;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "dbrepair",
    about = "SQLite/SQLCipher maintenance tool",
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(name = "check", about = "Report whether the database is corrupted", disable_help_flag = true, args_override_self = true)]
    Check(Target),
    #[command(name = "backup", about = "Write a <path>-backup copy", disable_help_flag = true, args_override_self = true)]
    Backup(Target),
    #[command(name = "deposit", about = "Set the database aside and start a fresh one with the same schema", disable_help_flag = true, args_override_self = true)]
    Deposit(Target),
    #[command(name = "contains-deposited", about = "Report whether deposited databases exist", disable_help_flag = true, args_override_self = true)]
    ContainsDeposited(Target),
    #[command(name = "remove-deposited", about = "Delete deposited databases", disable_help_flag = true, args_override_self = true)]
    RemoveDeposited(Target),
    #[command(name = "repair", about = "Salvage readable rows into a fresh database", disable_help_flag = true, args_override_self = true)]
    Repair(Target),
    #[command(external_subcommand)]
    Unknown(Vec<String>),
}

#[derive(Args, Debug)]
struct Target {
    #[arg(help = "Database file path")]
    path: String,
    #[command(flatten)]
    flags: Flags,
}

#[derive(Args, Debug)]
struct Flags {
    #[arg(long = "key-hex", value_parser = parse_key, help = "Raw cipher key as hexadecimal; whitespace is ignored")]
    key_hex: Option<CipherKey>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_FLAG_INTEGER)), help = "Cipher page size")]
    cipher_page_size: Option<u32>,
    #[arg(long, value_enum, help = "SQLCipher compatibility version")]
    cipher_version: Option<VersionArg>,
    #[arg(long = "kdf-iter", value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_FLAG_INTEGER)), help = "KDF iteration count")]
    kdf_iter: Option<u32>,
    #[arg(long, help = "HMAC algorithm name, passed through verbatim")]
    cipher_hmac_algorithm: Option<String>,
    #[arg(long, help = "Do not print PROGRESS= lines")]
    no_progress: bool,
    #[arg(long, help = "Do not print SQL trace lines")]
    no_sql_trace: bool,
    #[arg(long, help = "Print SQL text only, without per-statement info")]
    no_full_sql_trace: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum VersionArg {
    #[value(name = "default")]
    Default,
    #[value(name = "1")]
    V1,
    #[value(name = "2")]
    V2,
    #[value(name = "3")]
    V3,
    #[value(name = "4")]
    V4,
}

impl From<VersionArg> for CipherVersion {
    fn from(v: VersionArg) -> Self {
        match v {
            VersionArg::Default => Self::Default,
            VersionArg::V1 => Self::V1,
            VersionArg::V2 => Self::V2,
            VersionArg::V3 => Self::V3,
            VersionArg::V4 => Self::V4,
        }
    }
}

fn parse_key(value: &str) -> Result<CipherKey, ParseError> {
    hexcodec::decode(value).map(CipherKey::new)
}

/// Parse a full argument vector (`argv[0]` is the program name).
pub fn parse<S: AsRef<str>>(argv: &[S]) -> Result<Options, ParseError> {
    let word = argv.get(1).map(AsRef::<str>::as_ref).ok_or(ParseError::MissingCommand)?;
    if Command::from_word(word) == Command::Help {
        return Ok(Options::help());
    }
    let args = argv.iter().map(|a| AsRef::<str>::as_ref(a).to_owned());
    let cli = Cli::try_parse_from(args).map_err(from_clap)?;
    into_options(cli.command)
}

fn into_options(command: Commands) -> Result<Options, ParseError> {
    let (command, target) = match command {
        Commands::Check(t) => (Command::Check, t),
        Commands::Backup(t) => (Command::Backup, t),
        Commands::Deposit(t) => (Command::Deposit, t),
        Commands::ContainsDeposited(t) => (Command::ContainsDeposited, t),
        Commands::RemoveDeposited(t) => (Command::RemoveDeposited, t),
        Commands::Repair(t) => (Command::Repair, t),
        Commands::Unknown(words) => {
            let mut words = words.into_iter();
            let word = words.next().unwrap_or_default();
            let path = words.next().ok_or(ParseError::MissingPath)?;
            return Ok(Options::new(Command::Invalid(word), checked_path(path)?));
        }
    };

    let Target { path, flags } = target;
    let mut opts = Options::new(command, checked_path(path)?);
    opts.show_progress = !flags.no_progress;
    opts.sql_trace_enabled = !flags.no_sql_trace;
    opts.full_sql_trace_enabled = !flags.no_full_sql_trace;
    opts.cipher_key = flags.key_hex;
    if let Some(size) = flags.cipher_page_size {
        opts.cipher_page_size = size;
    }
    if let Some(v) = flags.cipher_version {
        opts.cipher_version = v.into();
    }
    opts.kdf_iterations = flags.kdf_iter;
    opts.cipher_hmac_algorithm = flags.cipher_hmac_algorithm;
    Ok(opts)
}

fn checked_path(path: String) -> Result<PathBuf, ParseError> {
    if path.is_empty() { Err(ParseError::EmptyPath) } else { Ok(PathBuf::from(path)) }
}

fn context_string(err: &clap::Error, kind: ContextKind) -> String {
    match err.get(kind) {
        Some(ContextValue::String(s)) => s.clone(),
        Some(ContextValue::Strings(v)) => v.first().cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Map a clap rejection onto the grammar's own error taxonomy.
fn from_clap(err: clap::Error) -> ParseError {
    if let Some(inner) = err.source().and_then(|s| s.downcast_ref::<ParseError>()) {
        return inner.clone();
    }
    // "--kdf-iter <KDF_ITER>" -> "--kdf-iter"
    let flag = context_string(&err, ContextKind::InvalidArg).split_whitespace().next().unwrap_or_default().to_string();
    let value = context_string(&err, ContextKind::InvalidValue);
    match err.kind() {
        ErrorKind::MissingRequiredArgument => ParseError::MissingPath,
        ErrorKind::MissingSubcommand | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => ParseError::MissingCommand,
        ErrorKind::UnknownArgument => ParseError::UnknownFlag(flag),
        ErrorKind::InvalidValue if value.is_empty() => ParseError::MissingValue(flag),
        ErrorKind::InvalidValue if flag == "--cipher-version" => ParseError::InvalidCipherVersion(value),
        ErrorKind::ValueValidation => ParseError::InvalidInteger { flag, value },
        _ => {
            let rendered = err.to_string();
            let first = rendered.lines().next().unwrap_or_default();
            ParseError::Rejected(first.trim_start_matches("error: ").to_string())
        }
    }
}
