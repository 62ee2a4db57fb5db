#![cfg(feature = "sqlcipher")]
//! Keyed databases, driven through the built binary so every run starts with
//! fresh process-wide SQLCipher defaults.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::process::Command;

const KEY_HEX: &str = "0102030405060708090a0b0c0d0e0f10";
const KEY_TEXT: &str = "\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f\x10";

/// Create a keyed database; `tuning` runs after the key and before the first write.
fn keyed(dir: &Path, name: &str, tuning: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let conn = Connection::open(&path).unwrap();
    conn.pragma_update(None, "key", KEY_TEXT).unwrap();
    for (pragma, value) in tuning {
        conn.pragma_update(None, pragma, value).unwrap();
    }
    conn.execute_batch("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT); INSERT INTO t(v) VALUES ('a'), ('b'), ('c');")
        .unwrap();
    path
}

fn dbrepair(args: &[&str]) -> (Option<i32>, String) {
    let out = Command::new(env!("CARGO_BIN_EXE_dbrepair"))
        .args(args)
        .env_remove("DBREPAIR_LOG_DIR")
        .env("DBREPAIR_LOG_LEVEL", "off")
        .output()
        .expect("spawn dbrepair");
    (out.status.code(), String::from_utf8_lossy(&out.stdout).into_owned())
}

fn result_line(out: &str) -> &str {
    out.lines().find(|l| l.starts_with("RESULT=")).unwrap_or_default()
}

#[test]
fn hex_key_bytes_open_a_keyed_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = keyed(dir.path(), "k.db", &[]);
    let (code, out) = dbrepair(&["check", db.to_str().unwrap(), "--key-hex", KEY_HEX]);
    assert_eq!(result_line(&out), "RESULT=check corrupted=false");
    assert_eq!(code, Some(0));
    assert!(out.contains("STATE=SQLCIPHER_KEY_SETUP detail=page_size=4096 version=default"));
    assert!(out.contains("sql=PRAGMA key = <redacted>"));
    assert!(!out.contains("0102030405"));
}

#[test]
fn wrong_key_reads_as_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let db = keyed(dir.path(), "k.db", &[]);
    let (code, out) = dbrepair(&["check", db.to_str().unwrap(), "--key-hex", "ffeeddccbbaa99887766554433221100"]);
    assert_eq!(result_line(&out), "RESULT=check corrupted=true");
    assert_eq!(code, Some(1));
}

#[test]
fn kdf_and_hmac_settings_reach_the_codec() {
    let dir = tempfile::tempdir().unwrap();
    let db = keyed(dir.path(), "tuned.db", &[("kdf_iter", "4000"), ("cipher_hmac_algorithm", "HMAC_SHA256")]);
    let path = db.to_str().unwrap();

    let (code, out) = dbrepair(&[
        "check",
        path,
        "--key-hex",
        KEY_HEX,
        "--kdf-iter",
        "4000",
        "--cipher-hmac-algorithm",
        "HMAC_SHA256",
    ]);
    assert!(out.contains("STATE=SQLCIPHER_PRAGMA_SETUP detail=kdf_iter=4000 hmac=HMAC_SHA256"));
    assert_eq!(result_line(&out), "RESULT=check corrupted=false");
    assert_eq!(code, Some(0));

    // the same key under SQLCipher's default KDF derives a different cipher key
    let (_, out) = dbrepair(&["check", path, "--key-hex", KEY_HEX]);
    assert_eq!(result_line(&out), "RESULT=check corrupted=true");
}

#[test]
fn explicit_kdf_survives_an_older_cipher_version() {
    let dir = tempfile::tempdir().unwrap();
    let db = keyed(dir.path(), "v3.db", &[("cipher_compatibility", "3"), ("kdf_iter", "1000")]);
    let (code, out) = dbrepair(&[
        "check",
        db.to_str().unwrap(),
        "--key-hex",
        KEY_HEX,
        "--cipher-version",
        "3",
        "--kdf-iter",
        "1000",
        "--cipher-page-size",
        "1024",
    ]);
    assert!(out.contains("STATE=SQLCIPHER_KEY_SETUP detail=page_size=1024 version=3"));
    assert_eq!(result_line(&out), "RESULT=check corrupted=false");
    assert_eq!(code, Some(0));
}

#[test]
fn cipher_pragmas_run_before_key_on_every_connection() {
    let dir = tempfile::tempdir().unwrap();
    let db = keyed(dir.path(), "enc.db", &[("kdf_iter", "4000")]);
    let (code, out) = dbrepair(&[
        "repair",
        db.to_str().unwrap(),
        "--key-hex",
        KEY_HEX,
        "--kdf-iter",
        "4000",
        "--no-full-sql-trace",
    ]);
    assert_eq!(result_line(&out), "RESULT=repair score=1.000000 ok=true");
    assert_eq!(code, Some(0));

    let sql: Vec<(&str, &str)> = out
        .lines()
        .filter_map(|l| l.strip_prefix("SQL "))
        .map(|l| {
            let handle = l.split(' ').find_map(|f| f.strip_prefix("handle=")).unwrap();
            let stmt = l.split_once(" sql=").unwrap().1;
            (handle, stmt)
        })
        .collect();
    let mut handles: Vec<&str> = sql.iter().map(|(h, _)| *h).collect();
    handles.sort_unstable();
    handles.dedup();
    assert!(handles.len() >= 2);
    for handle in handles {
        let stmts: Vec<&str> = sql.iter().filter(|(h, _)| *h == handle).map(|(_, s)| *s).collect();
        assert_eq!(stmts[..3], ["PRAGMA cipher_default_kdf_iter = 4000", "PRAGMA key = <redacted>", "PRAGMA cipher_page_size = 4096"], "handle {handle}");
    }

    let reopened = Connection::open(&db).unwrap();
    reopened.pragma_update(None, "key", KEY_TEXT).unwrap();
    reopened.pragma_update(None, "kdf_iter", "4000").unwrap();
    let rows: i64 = reopened.query_row("SELECT count(*) FROM t", [], |r| r.get(0)).unwrap();
    assert_eq!(rows, 3);
}
