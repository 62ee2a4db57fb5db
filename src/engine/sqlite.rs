//! [`RepairEngine`] over SQLite (or SQLCipher with the `sqlcipher` feature).
//!
//! The adapter is lazy: nothing touches the disk until an operation runs, and
//! every operation opens its own connection. Each new connection runs the
//! registered configs in priority order, then the cipher key pragmas.

use super::{ConnectionConfig, EngineSink, RepairEngine, TraceEvent, TraceMode, salvage};
use crate::cli::util::cipher_backend;
use crate::errors::EngineError;
use crate::fsutil;
use crate::options::{CipherKey, CipherVersion};
use log::{debug, info, warn};
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Instant;

const HANDLE_BASE: u64 = 0x5f3a_0000;

const SCHEMA_SQL: &str = "SELECT type, name, tbl_name, sql FROM sqlite_master \
     WHERE sql IS NOT NULL AND substr(name, 1, 7) <> 'sqlite_' ORDER BY rowid";

/// Quote `s` as an SQL string literal.
#[must_use]
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote `s` as an SQL identifier.
#[must_use]
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Whether this build links SQLCipher. Plain SQLite ignores every cipher
/// pragma, so cipher settings must be refused rather than dropped.
#[must_use]
pub fn cipher_supported() -> bool {
    cipher_backend() == "sqlcipher"
}

fn unsupported_cipher() -> EngineError {
    EngineError::Config(format!(
        "this build uses the {} backend without SQLCipher; cipher settings cannot be applied",
        cipher_backend()
    ))
}

/// True for pragmas only SQLCipher understands (`key`, `kdf_iter`, `cipher_*`, ...).
#[must_use]
pub fn is_cipher_statement(sql: &str) -> bool {
    let lower = sql.trim_start().to_ascii_lowercase();
    let Some(rest) = lower.strip_prefix("pragma") else {
        return false;
    };
    let qualified: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    let name = qualified.rsplit('.').next().unwrap_or_default();
    name.starts_with("cipher")
        || name.starts_with("hmac")
        || name.contains("kdf")
        || matches!(name, "key" | "rekey" | "hexkey" | "hexrekey")
}

/// Hands key bytes to the codec as a passphrase, bypassing SQL text so any
/// byte value (NUL included) reaches the KDF unchanged.
#[cfg(feature = "sqlcipher")]
mod codec {
    use crate::errors::EngineError;
    use rusqlite::{Connection, ffi};
    use std::ffi::{c_int, c_void};

    unsafe extern "C" {
        fn sqlite3_key(db: *mut ffi::sqlite3, key: *const c_void, n: c_int) -> c_int;
    }

    pub(super) fn set_key(conn: &Connection, key: &[u8]) -> Result<(), EngineError> {
        let n = c_int::try_from(key.len()).map_err(|_| EngineError::Config("cipher key is too long".into()))?;
        // SAFETY: the handle stays valid while `conn` is borrowed and
        // sqlite3_key copies the key before returning.
        let rc = unsafe { sqlite3_key(conn.handle(), key.as_ptr().cast(), n) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(rusqlite::Error::SqliteFailure(ffi::Error::new(rc), Some("sqlite3_key failed".into())).into())
        }
    }
}

#[cfg(not(feature = "sqlcipher"))]
mod codec {
    use crate::errors::EngineError;
    use rusqlite::Connection;

    pub(super) fn set_key(_conn: &Connection, _key: &[u8]) -> Result<(), EngineError> {
        Err(super::unsupported_cipher())
    }
}

/// Errors SQLite raises when the file itself is damaged or unreadable with the given key.
#[must_use]
pub fn is_corruption(e: &rusqlite::Error) -> bool {
    matches!(e.sqlite_error_code(), Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt))
}

/// An open connection plus the identity reported on trace lines.
pub(crate) struct Handle {
    pub(crate) conn: Connection,
    pub(crate) id: String,
    pub(crate) path: PathBuf,
}

/// Per-operation context: routes trace events and progress to the caller's sink.
pub(crate) struct Session<'s> {
    tag: i64,
    mode: TraceMode,
    sink: &'s mut dyn EngineSink,
}

impl<'s> Session<'s> {
    pub(crate) fn new(tag: i64, mode: TraceMode, sink: &'s mut dyn EngineSink) -> Self {
        Self { tag, mode, sink }
    }

    pub(crate) fn exec(&mut self, h: &Handle, sql: &str) -> rusqlite::Result<()> {
        let started = Instant::now();
        let res = h.conn.execute_batch(sql);
        self.trace(h, sql, started);
        res
    }

    /// Key the connection; traced with the key redacted.
    pub(crate) fn key(&mut self, h: &Handle, key: &[u8]) -> Result<(), EngineError> {
        let started = Instant::now();
        let res = codec::set_key(&h.conn, key);
        self.trace(h, "PRAGMA key = <redacted>", started);
        res
    }

    pub(crate) fn query_row<T, F>(&mut self, h: &Handle, sql: &str, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let started = Instant::now();
        let res = h.conn.query_row(sql, [], f);
        self.trace(h, sql, started);
        res
    }

    pub(crate) fn trace(&mut self, h: &Handle, sql: &str, started: Instant) {
        if self.mode == TraceMode::Disabled {
            return;
        }
        let info = (self.mode == TraceMode::Full).then(|| {
            format!("changes={} elapsed_us={}", h.conn.changes(), started.elapsed().as_micros())
        });
        self.sink.on_trace_event(&TraceEvent {
            tag: self.tag,
            handle: &h.id,
            path: &h.path,
            sql,
            info: info.as_deref(),
        });
    }

    pub(crate) fn progress(&mut self, fraction: f64, increment: f64) -> bool {
        self.sink.on_progress(fraction, increment)
    }
}

/// One row of `sqlite_master`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SchemaEntry {
    pub(crate) kind: String,
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) sql: String,
}

impl SchemaEntry {
    pub(crate) fn is_table(&self) -> bool {
        self.kind == "table"
    }

    pub(crate) fn is_virtual_table(&self) -> bool {
        self.is_table() && self.sql.trim_start().to_ascii_uppercase().starts_with("CREATE VIRTUAL")
    }
}

pub(crate) fn read_schema(session: &mut Session<'_>, h: &Handle) -> rusqlite::Result<Vec<SchemaEntry>> {
    let started = Instant::now();
    let res = (|| -> rusqlite::Result<Vec<SchemaEntry>> {
        let mut stmt = h.conn.prepare(SCHEMA_SQL)?;
        let rows = stmt.query_map([], |r| {
            Ok(SchemaEntry { kind: r.get(0)?, name: r.get(1)?, table: r.get(2)?, sql: r.get(3)? })
        })?;
        rows.collect()
    })();
    session.trace(h, SCHEMA_SQL, started);
    res
}

#[derive(Clone)]
struct CipherSettings {
    key: CipherKey,
    page_size: u32,
    version: CipherVersion,
}

/// SQLite-backed engine bound to one database path.
pub struct SqliteDatabase {
    path: PathBuf,
    tag: i64,
    trace: TraceMode,
    configs: Vec<ConnectionConfig>,
    cipher: Option<CipherSettings>,
    opened: u64,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("path", &self.path)
            .field("tag", &self.tag)
            .field("trace", &self.trace)
            .field("configs", &self.configs.iter().map(|c| c.name.as_str()).collect::<Vec<_>>())
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

impl SqliteDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tag: 0,
            trace: TraceMode::Disabled,
            configs: Vec::new(),
            cipher: None,
            opened: 0,
        }
    }

    /// Tag printed on trace lines.
    #[must_use]
    pub fn with_tag(mut self, tag: i64) -> Self {
        self.tag = tag;
        self
    }

    #[cfg(test)]
    pub(crate) fn trace_mode(&self) -> TraceMode {
        self.trace
    }

    /// Registered configs in execution order.
    #[cfg(test)]
    pub(crate) fn configs(&self) -> &[ConnectionConfig] {
        &self.configs
    }

    #[cfg(test)]
    pub(crate) fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub(crate) fn session<'s>(&self, sink: &'s mut dyn EngineSink) -> Session<'s> {
        Session::new(self.tag, self.trace, sink)
    }

    /// Open `path` and run the connection setup sequence on it.
    pub(crate) fn open_handle(
        &mut self,
        session: &mut Session<'_>,
        path: &Path,
        create: bool,
    ) -> Result<Handle, EngineError> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(path, flags)?;
        self.opened += 1;
        let handle = Handle {
            conn,
            id: format!("{:#010x}", HANDLE_BASE + self.opened),
            path: path.to_path_buf(),
        };
        debug!(target: "dbrepair::engine", "opened {} on {}", handle.id, path.display());

        // the version preset goes first so explicit KDF/HMAC settings override it
        if let Some(v) = self.cipher.as_ref().and_then(|c| c.version.compatibility()) {
            session.exec(&handle, &format!("PRAGMA cipher_default_compatibility = {v}"))?;
        }
        for config in &self.configs {
            for stmt in &config.statements {
                session.exec(&handle, stmt).map_err(|e| {
                    warn!(target: "dbrepair::engine", "config {} failed on {}: {e}", config.name, handle.id);
                    e
                })?;
            }
        }
        if let Some(cipher) = &self.cipher {
            session.key(&handle, cipher.key.as_bytes())?;
            session.exec(&handle, &format!("PRAGMA cipher_page_size = {}", cipher.page_size))?;
        }
        Ok(handle)
    }

    fn require_existing(&self) -> Result<(), EngineError> {
        if self.path.is_file() { Ok(()) } else { Err(EngineError::NotFound(self.path.clone())) }
    }
}

impl RepairEngine for SqliteDatabase {
    fn path(&self) -> &Path {
        &self.path
    }

    fn set_sql_trace(&mut self, mode: TraceMode) {
        self.trace = mode;
    }

    fn set_config(&mut self, config: ConnectionConfig) -> Result<(), EngineError> {
        if config.name.trim().is_empty() {
            return Err(EngineError::Config("config name is empty".into()));
        }
        if config.statements.iter().any(|s| s.trim().is_empty() || s.contains('\0')) {
            return Err(EngineError::Config(format!("config {} has an empty or invalid statement", config.name)));
        }
        if !cipher_supported() && config.statements.iter().any(|s| is_cipher_statement(s)) {
            return Err(unsupported_cipher());
        }
        self.configs.retain(|c| c.name != config.name);
        self.configs.push(config);
        // stable: equal priorities keep registration order
        self.configs.sort_by_key(|c| c.priority);
        Ok(())
    }

    fn set_cipher_key(&mut self, key: &[u8], page_size: u32, version: CipherVersion) -> Result<(), EngineError> {
        if !cipher_supported() {
            return Err(unsupported_cipher());
        }
        if key.is_empty() {
            return Err(EngineError::Config("cipher key is empty".into()));
        }
        if !(512..=65536).contains(&page_size) || !page_size.is_power_of_two() {
            return Err(EngineError::Config(format!(
                "cipher page size {page_size} must be a power of two between 512 and 65536"
            )));
        }
        self.cipher = Some(CipherSettings { key: CipherKey::new(key.to_vec()), page_size, version });
        Ok(())
    }

    fn check_if_corrupted(&mut self, sink: &mut dyn EngineSink) -> Result<bool, EngineError> {
        if !self.path.exists() {
            info!(target: "dbrepair::engine", "{} does not exist; nothing to check", self.path.display());
            return Ok(false);
        }
        let path = self.path.clone();
        let mut session = self.session(sink);
        let verdict = self
            .open_handle(&mut session, &path, false)
            .and_then(|h| Ok(session.query_row(&h, "PRAGMA integrity_check", |r| r.get::<_, String>(0))?));
        match verdict {
            Ok(first) => {
                let corrupted = first != "ok";
                if corrupted {
                    warn!(target: "dbrepair::engine", "integrity_check on {}: {first}", path.display());
                }
                Ok(corrupted)
            }
            Err(EngineError::Sqlite(e)) if is_corruption(&e) => {
                warn!(target: "dbrepair::engine", "{} is unreadable: {e}", path.display());
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    fn backup(&mut self, sink: &mut dyn EngineSink) -> Result<(), EngineError> {
        self.require_existing()?;
        let path = self.path.clone();
        let target = tempfile::Builder::new()
            .prefix(".dbrepair-backup-")
            .suffix(".db")
            .tempfile_in(fsutil::parent_dir(&path))?
            .into_temp_path();
        {
            let mut session = self.session(sink);
            let h = self.open_handle(&mut session, &path, false)?;
            session.exec(&h, &format!("VACUUM INTO {}", quote_literal(&target.to_string_lossy())))?;
        }
        let dest = fsutil::backup_path(&path);
        target.persist(&dest)?;
        info!(target: "dbrepair::engine", "backup of {} written to {}", path.display(), dest.display());
        Ok(())
    }

    fn deposit(&mut self, sink: &mut dyn EngineSink) -> Result<(), EngineError> {
        self.require_existing()?;
        let path = self.path.clone();
        let mut session = self.session(sink);
        let schema = {
            let h = self.open_handle(&mut session, &path, false)?;
            read_schema(&mut session, &h).unwrap_or_else(|e| {
                warn!(target: "dbrepair::engine", "schema of {} unreadable, depositing as-is: {e}", path.display());
                Vec::new()
            })
        };

        let dir = fsutil::deposited_dir(&path);
        std::fs::create_dir_all(&dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S%3f").to_string();
        let dest = fsutil::unique_db_path(&dir, &stamp);
        fsutil::move_with_companions(&path, &dest)?;
        info!(target: "dbrepair::engine", "deposited {} as {}", path.display(), dest.display());

        let fresh = self.open_handle(&mut session, &path, true)?;
        let ordered = schema.iter().filter(|e| e.is_table()).chain(schema.iter().filter(|e| !e.is_table()));
        for entry in ordered {
            if let Err(e) = session.exec(&fresh, &entry.sql) {
                warn!(target: "dbrepair::engine", "could not recreate {} {}: {e}", entry.kind, entry.name);
            }
        }
        Ok(())
    }

    fn contains_deposited(&self) -> Result<bool, EngineError> {
        Ok(!fsutil::list_deposited(&self.path)?.is_empty())
    }

    fn remove_deposited(&mut self) -> Result<(), EngineError> {
        let dir = fsutil::deposited_dir(&self.path);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            info!(target: "dbrepair::engine", "removed {}", dir.display());
        }
        Ok(())
    }

    fn retrieve(&mut self, sink: &mut dyn EngineSink) -> Result<f64, EngineError> {
        salvage::retrieve(self, sink)
    }
}
