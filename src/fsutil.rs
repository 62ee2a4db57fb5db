use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Files SQLite keeps next to a database and that must travel with it.
pub const COMPANION_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// `path` with `suffix` appended to its file name (`a.db` + `-wal` = `a.db-wal`).
#[must_use]
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[must_use]
pub fn backup_path(db: &Path) -> PathBuf {
    sibling(db, "-backup")
}

#[must_use]
pub fn corrupted_path(db: &Path) -> PathBuf {
    sibling(db, "-corrupted")
}

#[must_use]
pub fn deposited_dir(db: &Path) -> PathBuf {
    sibling(db, ".deposited")
}

/// Directory holding `db`, falling back to `.` for bare file names.
#[must_use]
pub fn parent_dir(db: &Path) -> PathBuf {
    match db.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Rename `from` and any companion files to `to` (+ the same suffixes).
///
/// # Errors
/// Returns the first rename failure. Companions that do not exist are skipped.
pub fn move_with_companions(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)?;
    for suffix in COMPANION_SUFFIXES {
        let src = sibling(from, suffix);
        if src.exists() {
            fs::rename(&src, sibling(to, suffix))?;
        }
    }
    Ok(())
}

/// Remove `path` and its companions if present.
///
/// # Errors
/// Returns an error if an existing file cannot be removed.
pub fn remove_with_companions(path: &Path) -> io::Result<()> {
    for p in std::iter::once(path.to_path_buf()).chain(COMPANION_SUFFIXES.iter().map(|s| sibling(path, s))) {
        match fs::remove_file(&p) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Deposited databases for `db`, oldest first. Missing directory yields an empty list.
///
/// # Errors
/// Returns an error if the directory exists but cannot be read.
pub fn list_deposited(db: &Path) -> io::Result<Vec<PathBuf>> {
    let dir = deposited_dir(db);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let p = entry?.path();
        if p.is_file() && p.extension().is_some_and(|e| e == "db") {
            out.push(p);
        }
    }
    out.sort();
    Ok(out)
}

/// A path `dir/<stem>.db` that does not exist yet, adding `-1`, `-2`, ... as needed.
#[must_use]
pub fn unique_db_path(dir: &Path, stem: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.db"));
    let mut n = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}-{n}.db"));
        n += 1;
    }
    candidate
}
