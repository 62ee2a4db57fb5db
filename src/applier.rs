//! Applies an [`Options`] to a live engine, in the order the engine needs:
//! tracing, then cipher pragmas, then the cipher key.
//!
//! Tracing goes first so the pragma and key statements show up on the trace.
//! The pragmas are registered as a highest-priority connection config so they
//! run on every new connection before the key is used to read a page.

use crate::engine::{ConnectionConfig, PRIORITY_HIGHEST, RepairEngine, TraceMode, sqlite::quote_literal};
use crate::options::Options;
use crate::protocol::Console;
use log::{info, warn};

/// Name of the connection config carrying KDF/HMAC pragmas.
pub const CIPHER_PRAGMA_CONFIG: &str = "dbrepair.cipher-pragmas";

/// Pragma statements for the KDF and HMAC settings in `opts`, in that order.
#[must_use]
pub fn cipher_pragma_statements(opts: &Options) -> Vec<String> {
    let mut stmts = Vec::new();
    if let Some(iter) = opts.kdf_iterations {
        stmts.push(format!("PRAGMA cipher_default_kdf_iter = {iter}"));
    }
    if let Some(algo) = &opts.cipher_hmac_algorithm {
        stmts.push(format!("PRAGMA cipher_default_hmac_algorithm = {}", quote_literal(algo)));
    }
    stmts
}

/// Outcome of each configuration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub trace: TraceMode,
    pub pragmas_ok: bool,
    pub key_ok: bool,
}

impl ApplyReport {
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.pragmas_ok && self.key_ok
    }
}

/// Configure `engine` from `opts`, reporting each step on `console`.
///
/// Failures are reported but never abort: the command still runs and
/// surfaces the consequence (a wrong key reads as corruption, for instance).
pub fn apply(engine: &mut dyn RepairEngine, opts: &Options, console: &mut Console<'_>) -> ApplyReport {
    let trace = TraceMode::from_flags(opts.sql_trace_enabled, opts.full_sql_trace_enabled);
    engine.set_sql_trace(trace);
    console.state_detail("SQL_TRACE_SETUP", trace.as_str());

    let pragmas_ok = apply_cipher_pragmas(engine, opts, console);
    let key_ok = apply_cipher_key(engine, opts, console);

    let report = ApplyReport { trace, pragmas_ok, key_ok };
    if !report.all_ok() {
        warn!(target: "dbrepair::applier", "configuration incomplete for {}: {report:?}", engine.path().display());
    }
    report
}

fn apply_cipher_pragmas(engine: &mut dyn RepairEngine, opts: &Options, console: &mut Console<'_>) -> bool {
    if !opts.has_cipher_pragmas() {
        console.state_detail("SQLCIPHER_PRAGMA_SETUP", "skipped");
        return true;
    }
    let config = ConnectionConfig {
        name: CIPHER_PRAGMA_CONFIG.to_string(),
        priority: PRIORITY_HIGHEST,
        statements: cipher_pragma_statements(opts),
    };
    match engine.set_config(config) {
        Ok(()) => {
            let kdf = opts.kdf_iterations.map_or_else(|| "-".to_string(), |n| n.to_string());
            let hmac = opts.cipher_hmac_algorithm.as_deref().unwrap_or("-");
            info!(target: "dbrepair::applier", "cipher pragmas registered: kdf_iter={kdf} hmac={hmac}");
            console.state_detail("SQLCIPHER_PRAGMA_SETUP", format_args!("kdf_iter={kdf} hmac={hmac}"));
            true
        }
        Err(e) => {
            warn!(target: "dbrepair::applier", "cipher pragma setup failed: {e}");
            console.state_detail("SQLCIPHER_PRAGMA_SETUP", format_args!("failed: {e}"));
            false
        }
    }
}

fn apply_cipher_key(engine: &mut dyn RepairEngine, opts: &Options, console: &mut Console<'_>) -> bool {
    let Some(key) = &opts.cipher_key else {
        console.state_detail("SQLCIPHER_KEY_SETUP", "skipped");
        return true;
    };
    match engine.set_cipher_key(key.as_bytes(), opts.cipher_page_size, opts.cipher_version) {
        Ok(()) => {
            info!(target: "dbrepair::applier", "cipher key set ({} bytes)", key.len());
            console.state_detail(
                "SQLCIPHER_KEY_SETUP",
                format_args!("page_size={} version={}", opts.cipher_page_size, opts.cipher_version),
            );
            true
        }
        Err(e) => {
            warn!(target: "dbrepair::applier", "cipher key setup failed: {e}");
            console.state_detail("SQLCIPHER_KEY_SETUP", format_args!("failed: {e}"));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CipherKey, Command};

    #[test]
    fn statements_follow_options() {
        let mut o = Options::new(Command::Repair, "x.db");
        assert!(cipher_pragma_statements(&o).is_empty());
        o.kdf_iterations = Some(4000);
        o.cipher_hmac_algorithm = Some("HMAC_SHA'1".into());
        assert_eq!(
            cipher_pragma_statements(&o),
            ["PRAGMA cipher_default_kdf_iter = 4000", "PRAGMA cipher_default_hmac_algorithm = 'HMAC_SHA''1'"]
        );
    }

    #[cfg(feature = "sqlcipher")]
    #[test]
    fn sqlite_engine_receives_configuration() {
        let mut engine = crate::engine::SqliteDatabase::new("x.db");
        let mut o = Options::new(Command::Repair, "x.db");
        o.kdf_iterations = Some(64000);
        o.cipher_key = Some(CipherKey::new(vec![1; 32]));
        o.full_sql_trace_enabled = false;
        let mut buf = Vec::new();
        let report = apply(&mut engine, &o, &mut Console::new(&mut buf));
        assert!(report.all_ok());
        assert_eq!(report.trace, TraceMode::Short);
        assert_eq!(engine.trace_mode(), TraceMode::Short);
        assert_eq!(engine.configs()[0].name, CIPHER_PRAGMA_CONFIG);
        assert!(engine.is_encrypted());
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(
            out,
            "STATE=SQL_TRACE_SETUP detail=short\n\
             STATE=SQLCIPHER_PRAGMA_SETUP detail=kdf_iter=64000 hmac=-\n\
             STATE=SQLCIPHER_KEY_SETUP detail=page_size=4096 version=default\n"
        );
    }

    #[cfg(not(feature = "sqlcipher"))]
    #[test]
    fn cipher_settings_fail_on_plain_sqlite() {
        let mut engine = crate::engine::SqliteDatabase::new("x.db");
        let mut o = Options::new(Command::Repair, "x.db");
        o.kdf_iterations = Some(64000);
        o.cipher_key = Some(CipherKey::new(vec![1; 32]));
        let mut buf = Vec::new();
        let report = apply(&mut engine, &o, &mut Console::new(&mut buf));
        assert!(!report.pragmas_ok && !report.key_ok);
        assert!(!report.all_ok());
        assert_eq!(engine.trace_mode(), TraceMode::Full);
        assert!(engine.configs().is_empty());
        assert!(!engine.is_encrypted());
        let out = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "STATE=SQL_TRACE_SETUP detail=full");
        assert!(lines[1].starts_with("STATE=SQLCIPHER_PRAGMA_SETUP detail=failed: ") && lines[1].contains("SQLCipher"));
        assert!(lines[2].starts_with("STATE=SQLCIPHER_KEY_SETUP detail=failed: ") && lines[2].contains("SQLCipher"));
    }

    #[test]
    fn rejected_key_is_reported_not_fatal() {
        let mut engine = crate::engine::SqliteDatabase::new("x.db");
        let mut o = Options::new(Command::Check, "x.db");
        o.cipher_key = Some(CipherKey::new(vec![1; 16]));
        o.cipher_page_size = 0;
        let mut buf = Vec::new();
        let report = apply(&mut engine, &o, &mut Console::new(&mut buf));
        assert!(report.pragmas_ok && !report.key_ok);
        assert!(String::from_utf8(buf).unwrap().contains("SQLCIPHER_KEY_SETUP detail=failed:"));
    }
}
