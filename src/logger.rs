//! Diagnostic logging via `log4rs`. Logs never go to stdout, which carries
//! the console protocol.

use crate::config::AppConfig;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_RETENTION: u32 = 7;

#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("warn").trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    }
}

fn file_appender(dir: &Path, retention: u32) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join("dbrepair.{}.log").display()), retention)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(dir.join("dbrepair.log"), Box::new(policy))?)
}

/// Build the log4rs configuration for `cfg`.
///
/// # Errors
/// Returns an error if the log directory cannot be created or the config is invalid.
pub fn build_config(cfg: &AppConfig) -> Result<Config, Box<dyn std::error::Error>> {
    let level = parse_level(cfg.log_level.as_deref());
    let appender: Box<dyn log4rs::append::Append> = match &cfg.log_dir {
        Some(dir) => Box::new(file_appender(dir, cfg.log_retention.unwrap_or(DEFAULT_RETENTION))?),
        None => Box::new(
            ConsoleAppender::builder()
                .target(Target::Stderr)
                .encoder(Box::new(PatternEncoder::new(PATTERN)))
                .build(),
        ),
    };
    Ok(Config::builder()
        .appender(Appender::builder().build("main", appender))
        .build(Root::builder().appender("main").build(level))?)
}

/// Install the global logger. Failures are ignored: a run without logs is still a valid run.
pub fn configure(cfg: &AppConfig) {
    match build_config(cfg) {
        Ok(config) => {
            let _ = log4rs::init_config(config);
        }
        Err(e) => eprintln!("dbrepair: logging disabled: {e}"),
    }
}
