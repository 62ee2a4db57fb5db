//! Row-level salvage behind [`SqliteDatabase::retrieve`](super::SqliteDatabase).
//!
//! Sources are read in order: the target database (or its `-backup` copy when
//! the target's schema cannot be read), then every deposited database. Rows go
//! into a fresh temporary database with `INSERT OR IGNORE`, so the first source
//! to supply a primary key wins. A table stops at its first unreadable row.

use super::sqlite::{Handle, SchemaEntry, Session, SqliteDatabase, quote_ident, read_schema};
use super::{EngineSink, RepairEngine};
use crate::errors::EngineError;
use crate::fsutil;
use log::{debug, info, warn};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Rows scanned between progress callbacks, whether or not they were kept.
const PROGRESS_STRIDE: u64 = 256;

struct Source {
    handle: Handle,
    schema: Vec<SchemaEntry>,
    /// `count(*)` per entry of `schema`; `None` for non-tables or unreadable counts.
    counts: Vec<Option<u64>>,
}

impl Source {
    fn tables(&self) -> impl Iterator<Item = (&SchemaEntry, Option<u64>)> {
        self.schema.iter().zip(self.counts.iter().copied()).filter(|(e, _)| e.is_table())
    }
}

struct Plan {
    sources: Vec<Source>,
    /// Files that exist but could not be read at all.
    unreadable: u64,
}

impl Plan {
    fn total_weight(&self) -> f64 {
        let tables: u64 = self.sources.iter().flat_map(Source::tables).map(|(_, c)| table_weight(c)).sum();
        (tables + self.unreadable) as f64
    }
}

fn table_weight(count: Option<u64>) -> u64 {
    count.unwrap_or(1).max(1)
}

/// Rows expected for a table, given what the scan saw.
fn expected_rows(count: Option<u64>, copied: u64, complete: bool) -> u64 {
    let lost = u64::from(!complete);
    match count {
        Some(c) if c > copied => c,
        Some(_) | None => copied + lost,
    }
}

fn open_source(db: &mut SqliteDatabase, session: &mut Session<'_>, path: &Path) -> Option<Source> {
    let handle = match db.open_handle(session, path, false) {
        Ok(h) => h,
        Err(e) => {
            warn!(target: "dbrepair::salvage", "cannot open {}: {e}", path.display());
            return None;
        }
    };
    let schema = match read_schema(session, &handle) {
        Ok(s) => s,
        Err(e) => {
            warn!(target: "dbrepair::salvage", "schema of {} unreadable: {e}", path.display());
            return None;
        }
    };
    let counts = schema
        .iter()
        .map(|entry| {
            if !entry.is_table() || entry.is_virtual_table() {
                return None;
            }
            let sql = format!("SELECT count(*) FROM {}", quote_ident(&entry.name));
            session
                .query_row(&handle, &sql, |r| r.get::<_, i64>(0))
                .ok()
                .and_then(|n| u64::try_from(n).ok())
        })
        .collect();
    Some(Source { handle, schema, counts })
}

fn plan(db: &mut SqliteDatabase, session: &mut Session<'_>, target: &Path) -> Result<Plan, EngineError> {
    let mut plan = Plan { sources: Vec::new(), unreadable: 0 };

    let primary = if target.is_file() { open_source(db, session, target) } else { None };
    match primary {
        Some(src) => plan.sources.push(src),
        None => {
            if target.is_file() {
                plan.unreadable += 1;
            }
            let backup = fsutil::backup_path(target);
            if backup.is_file() {
                info!(target: "dbrepair::salvage", "falling back to {}", backup.display());
                match open_source(db, session, &backup) {
                    Some(src) => plan.sources.push(src),
                    None => plan.unreadable += 1,
                }
            }
        }
    }

    for deposited in fsutil::list_deposited(target)? {
        match open_source(db, session, &deposited) {
            Some(src) => plan.sources.push(src),
            None => plan.unreadable += 1,
        }
    }
    Ok(plan)
}

/// Maps rows scanned within one table onto the overall fraction.
struct Window {
    done: f64,
    weight: f64,
    total: f64,
}

impl Window {
    fn at(&self, scanned: u64) -> f64 {
        if self.total <= 0.0 {
            return 1.0;
        }
        ((self.done + (scanned as f64).min(self.weight)) / self.total).clamp(0.0, 1.0)
    }
}

struct Progress {
    last: f64,
}

impl Progress {
    fn report(&mut self, session: &mut Session<'_>, fraction: f64) -> bool {
        let increment = (fraction - self.last).max(0.0);
        self.last = fraction.max(self.last);
        session.progress(self.last, increment)
    }
}

struct TableCopy {
    copied: u64,
    complete: bool,
    cancelled: bool,
}

fn copy_table(
    session: &mut Session<'_>,
    progress: &mut Progress,
    src: &Handle,
    out: &Handle,
    entry: &SchemaEntry,
    window: &Window,
) -> TableCopy {
    let mut result = TableCopy { copied: 0, complete: false, cancelled: false };
    let select = format!("SELECT * FROM {}", quote_ident(&entry.name));
    let started = Instant::now();
    let mut stmt = match src.conn.prepare(&select) {
        Ok(s) => s,
        Err(e) => {
            session.trace(src, &select, started);
            warn!(target: "dbrepair::salvage", "{}: cannot read {}: {e}", src.path.display(), entry.name);
            return result;
        }
    };
    let columns = stmt.column_count();
    let placeholders = (1..=columns).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    let insert_sql = format!("INSERT OR IGNORE INTO {} VALUES ({placeholders})", quote_ident(&entry.name));
    let mut insert = match out.conn.prepare(&insert_sql) {
        Ok(s) => s,
        Err(e) => {
            warn!(target: "dbrepair::salvage", "cannot write {}: {e}", entry.name);
            return result;
        }
    };

    let mut scanned: u64 = 0;
    match stmt.query([]) {
        Ok(mut rows) => loop {
            match rows.next() {
                Ok(Some(row)) => {
                    scanned += 1;
                    let values: rusqlite::Result<Vec<Value>> = (0..columns).map(|i| row.get::<_, Value>(i)).collect();
                    match values {
                        Ok(values) => match insert.execute(params_from_iter(values)) {
                            Ok(_) => result.copied += 1,
                            Err(e) => debug!(target: "dbrepair::salvage", "{}: row rejected: {e}", entry.name),
                        },
                        Err(e) => {
                            warn!(target: "dbrepair::salvage", "{}: stopped at unreadable row: {e}", entry.name);
                            break;
                        }
                    }
                    if scanned % PROGRESS_STRIDE == 0 && !progress.report(session, window.at(scanned)) {
                        result.cancelled = true;
                        break;
                    }
                }
                Ok(None) => {
                    result.complete = true;
                    break;
                }
                Err(e) => {
                    warn!(target: "dbrepair::salvage", "{}: stopped after {} rows: {e}", entry.name, result.copied);
                    break;
                }
            }
        },
        Err(e) => warn!(target: "dbrepair::salvage", "{}: scan failed: {e}", entry.name),
    }
    session.trace(src, &select, started);
    session.trace(out, &insert_sql, started);
    result
}

/// Counters for the score.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    recovered: u64,
    expected: u64,
}

impl Tally {
    fn score(self, any_source: bool) -> f64 {
        if self.expected == 0 {
            return if any_source { 1.0 } else { 0.0 };
        }
        (self.recovered as f64 / self.expected as f64).clamp(0.0, 1.0)
    }
}

pub(crate) fn retrieve(db: &mut SqliteDatabase, sink: &mut dyn EngineSink) -> Result<f64, EngineError> {
    let target: PathBuf = db.path().to_path_buf();
    let mut session = db.session(sink);
    let plan = plan(db, &mut session, &target)?;
    if plan.sources.is_empty() {
        warn!(target: "dbrepair::salvage", "nothing readable for {}", target.display());
        session.progress(1.0, 1.0);
        return Ok(0.0);
    }

    let temp = tempfile::Builder::new()
        .prefix(".dbrepair-retrieve-")
        .suffix(".db")
        .tempfile_in(fsutil::parent_dir(&target))?
        .into_temp_path();
    let out = db.open_handle(&mut session, &temp, false)?;
    session.exec(&out, "BEGIN")?;

    let total = plan.total_weight();
    let mut progress = Progress { last: 0.0 };
    let mut tally = Tally { recovered: 0, expected: plan.unreadable };
    let mut created: HashSet<String> = HashSet::new();
    let mut done = 0.0;
    let mut cancelled = false;

    'sources: for src in &plan.sources {
        for (entry, count) in src.tables() {
            let weight = table_weight(count) as f64;
            if entry.is_virtual_table() {
                warn!(target: "dbrepair::salvage", "skipping virtual table {}", entry.name);
                done += weight;
                continue;
            }
            if created.insert(entry.name.clone()) {
                if let Err(e) = session.exec(&out, &entry.sql) {
                    warn!(target: "dbrepair::salvage", "cannot create {}: {e}", entry.name);
                }
            }
            let window = Window { done, weight, total };
            let copy = copy_table(&mut session, &mut progress, &src.handle, &out, entry, &window);
            if copy.cancelled {
                cancelled = true;
                break 'sources;
            }
            tally.recovered += copy.copied;
            tally.expected += expected_rows(count, copy.copied, copy.complete);
            done += weight;
            if !progress.report(&mut session, window.at(u64::MAX)) {
                cancelled = true;
                break 'sources;
            }
        }
    }

    if cancelled {
        info!(target: "dbrepair::salvage", "retrieve of {} cancelled; nothing changed", target.display());
        return Ok(0.0);
    }

    for src in &plan.sources {
        for entry in src.schema.iter().filter(|e| !e.is_table()) {
            if created.insert(entry.name.clone()) {
                if let Err(e) = session.exec(&out, &entry.sql) {
                    warn!(target: "dbrepair::salvage", "cannot recreate {} {} on {}: {e}", entry.kind, entry.name, entry.table);
                }
            }
        }
    }
    session.exec(&out, "COMMIT")?;
    progress.report(&mut session, 1.0);

    let score = tally.score(true);
    info!(
        target: "dbrepair::salvage",
        "retrieved {} of {} rows from {} source(s), score {score:.6}",
        tally.recovered,
        tally.expected,
        plan.sources.len()
    );
    drop(out);
    drop(plan);

    if score > 0.0 {
        if target.exists() {
            let corrupted = fsutil::corrupted_path(&target);
            fsutil::remove_with_companions(&corrupted)?;
            fsutil::move_with_companions(&target, &corrupted)?;
        }
        temp.persist(&target)?;
        db.remove_deposited()?;
    }
    Ok(score)
}
