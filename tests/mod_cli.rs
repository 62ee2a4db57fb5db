use dbrepair::{ExitCode, run};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

fn seed(dir: &Path, name: &str, rows: i64) -> PathBuf {
    let path = dir.join(name);
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").unwrap();
    for i in 0..rows {
        conn.execute("INSERT INTO t(id, v) VALUES (?1, ?2)", rusqlite::params![i, format!("row{i}")]).unwrap();
    }
    path
}

fn invoke(args: &[&str]) -> (ExitCode, String, String) {
    let mut argv = vec!["dbrepair"];
    argv.extend_from_slice(args);
    let mut out = Vec::new();
    let mut err = Vec::new();
    let code = run(&argv, &mut out, &mut err);
    (code, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
}

fn result_lines(out: &str) -> Vec<&str> {
    out.lines().filter(|l| l.starts_with("RESULT=")).collect()
}

#[test]
fn check_healthy_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed(dir.path(), "good.db", 3);
    let (code, out, _) = invoke(&["check", db.to_str().unwrap()]);
    assert_eq!(code, ExitCode::Success);
    assert_eq!(result_lines(&out), ["RESULT=check corrupted=false"]);
    assert!(out.starts_with("STATE=INIT detail=check\n"));
    assert!(out.contains("sql=PRAGMA integrity_check info=changes="));
}

#[test]
fn check_garbage_file_reports_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("junk.db");
    std::fs::write(&db, vec![0xab; 4096]).unwrap();
    let (code, out, _) = invoke(&["check", db.to_str().unwrap(), "--no-sql-trace"]);
    assert_eq!(code, ExitCode::Failure);
    assert_eq!(result_lines(&out), ["RESULT=check corrupted=true"]);
    assert!(!out.contains("SQL tag="));
}

#[test]
fn short_trace_has_no_info() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed(dir.path(), "good.db", 1);
    let (_, out, _) = invoke(&["check", db.to_str().unwrap(), "--no-full-sql-trace"]);
    let sql: Vec<_> = out.lines().filter(|l| l.starts_with("SQL ")).collect();
    assert!(!sql.is_empty());
    assert!(sql.iter().all(|l| !l.contains(" info=")));
    assert!(out.contains("STATE=SQL_TRACE_SETUP detail=short"));
}

#[test]
fn bad_key_hex_fails_before_init() {
    let (code, out, err) = invoke(&["repair", "x.db", "--key-hex", "zz"]);
    assert_eq!(code, ExitCode::Usage);
    assert!(!out.contains("STATE=INIT"));
    assert_eq!(result_lines(&out), ["RESULT=invalid error=invalid hex character 'z' at position 0"]);
    assert!(err.contains("Usage:"));
}

#[test]
fn missing_path_and_unknown_flag_are_usage_errors() {
    let (code, out, _) = invoke(&["repair"]);
    assert_eq!(code, ExitCode::Usage);
    assert!(out.contains("error=missing database path"));
    let (code, out, _) = invoke(&["check", "x.db", "--frobnicate"]);
    assert_eq!(code, ExitCode::Usage);
    assert!(out.contains("error=unknown flag: --frobnicate"));
    let (code, _, _) = invoke(&["check", "x.db", "--cipher-page-size", "1000000001"]);
    assert_eq!(code, ExitCode::Usage);
}

#[test]
fn unknown_command_exits_two() {
    let (code, out, err) = invoke(&["unknown", "path"]);
    assert_eq!(code, ExitCode::Usage);
    assert_eq!(out, "RESULT=invalid error=unknown command: unknown\n");
    assert!(err.contains("Usage:"));
}

#[test]
fn help_prints_usage_only() {
    for word in ["help", "-h", "--help"] {
        let (code, out, err) = invoke(&[word]);
        assert_eq!(code, ExitCode::Success);
        assert_eq!(out, "RESULT=help\n");
        assert!(err.contains("dbrepair contains-deposited <dbPath>"));
    }
}

#[test]
fn backup_of_missing_database_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("absent.db");
    let (code, out, _) = invoke(&["backup", db.to_str().unwrap()]);
    assert_eq!(code, ExitCode::Failure);
    assert!(result_lines(&out)[0].starts_with("RESULT=backup ok=false error=database not found:"));
    assert!(!db.exists());
}

#[test]
fn deposit_lifecycle_through_cli() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed(dir.path(), "app.db", 5);
    let p = db.to_str().unwrap();

    let (code, out, _) = invoke(&["contains-deposited", p, "--no-sql-trace"]);
    assert_eq!((code, result_lines(&out)), (ExitCode::Failure, vec!["RESULT=contains-deposited present=false"]));

    let (code, out, _) = invoke(&["deposit", p]);
    assert_eq!((code, result_lines(&out)), (ExitCode::Success, vec!["RESULT=deposit ok=true"]));
    assert!(out.contains("STATE=DEPOSIT_START"));

    let (code, _, _) = invoke(&["contains-deposited", p]);
    assert_eq!(code, ExitCode::Success);

    let (code, out, _) = invoke(&["remove-deposited", p]);
    assert_eq!((code, result_lines(&out)), (ExitCode::Success, vec!["RESULT=remove-deposited ok=true"]));
    let (code, _, _) = invoke(&["contains-deposited", p]);
    assert_eq!(code, ExitCode::Failure);
}

#[test]
fn repair_of_healthy_database_scores_one() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed(dir.path(), "ok.db", 10);
    let (code, out, _) = invoke(&["repair", db.to_str().unwrap(), "--no-progress"]);
    assert_eq!(code, ExitCode::Success);
    assert!(out.ends_with("STATE=REPAIR_DONE\nRESULT=repair score=1.000000 ok=true\n"));
    assert!(!out.contains("PROGRESS="));
}

#[test]
fn repair_with_nothing_readable_scores_zero() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("junk.db");
    std::fs::write(&db, vec![0x5a; 8192]).unwrap();
    let (code, out, _) = invoke(&["repair", db.to_str().unwrap()]);
    assert_eq!(code, ExitCode::Failure);
    assert_eq!(result_lines(&out), ["RESULT=repair score=0.000000 ok=false"]);
    assert_eq!(std::fs::read(&db).unwrap(), vec![0x5a; 8192]);
}

#[cfg(not(feature = "sqlcipher"))]
#[test]
fn cipher_options_fail_loudly_without_sqlcipher() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed(dir.path(), "plain.db", 2);
    let (code, out, _) = invoke(&[
        "check",
        db.to_str().unwrap(),
        "--key-hex",
        "0102030405060708090a0b0c0d0e0f10",
        "--kdf-iter",
        "4000",
    ]);
    assert!(out.contains("STATE=SQLCIPHER_PRAGMA_SETUP detail=failed: "));
    assert!(out.contains("STATE=SQLCIPHER_KEY_SETUP detail=failed: "));
    assert!(!out.contains("0102030405060708"));
    assert!(!out.lines().any(|l| l.starts_with("SQL ") && (l.contains("PRAGMA key") || l.contains("kdf_iter"))));
    // the command still runs against the unkeyed file
    assert_eq!(code, ExitCode::Success);
    assert_eq!(result_lines(&out), ["RESULT=check corrupted=false"]);
}
