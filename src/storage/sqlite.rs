//! `SQLite` record store.
//!
//! One table per resource family (see `migrations/`). Reconciliation runs in a
//! single transaction, so readers never observe the upserted listing without
//! its stale-row eviction, and a failure leaves the previous rows intact.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::broadcast;

use super::cache::{
    CHANGE_CHANNEL_CAPACITY, CacheChange, CachedRecord, Reconciled, RecordQuery, RecordStore, Scope,
    notify,
};
use crate::error::{FinsyncError, Result};
use crate::models::ResourceKind;

const CACHE_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("../../migrations/001_resource_cache.sql"),
}];

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

/// Run schema migrations for the record cache database.
///
/// Returns the latest schema version applied.
///
/// # Errors
///
/// Returns an error if creating the migrations table, reading the schema version,
/// or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| FinsyncError::Cache(format!("create schema_migrations: {e}")))?;

    let mut current_version: i32 = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .map_err(|e| FinsyncError::Cache(format!("read schema version: {e}")))?
        .unwrap_or(0);

    for migration in CACHE_MIGRATIONS {
        if migration.version > current_version {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql).map_err(|e| {
                FinsyncError::Cache(format!("apply migration {}: {e}", migration.version))
            })?;
            tx.execute(
                "INSERT INTO schema_migrations (version) VALUES (?1)",
                [migration.version],
            )?;
            tx.commit()?;
            tracing::debug!(version = migration.version, "Applied cache migration");
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

/// Record store backed by a single `SQLite` connection.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<CacheChange>,
}

impl SqliteRecordStore {
    /// Create or open a cache database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the database
    /// cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| FinsyncError::Cache(format!("open cache db {}: {e}", path.display())))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "Opened cache database");
        Self::from_connection(conn)
    }

    /// Open an in-memory cache database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FinsyncError::Cache(format!("open in-memory db: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        run_migrations(&mut conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn upsert_rows(conn: &Connection, kind: ResourceKind, records: &[CachedRecord]) -> Result<Vec<i64>> {
    // Rows whose payload and parent are unchanged keep their timestamp.
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO {table} (id, parent_id, payload, updated_at) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(id) DO UPDATE SET \
            parent_id = excluded.parent_id, \
            payload = excluded.payload, \
            updated_at = excluded.updated_at \
         WHERE {table}.payload IS NOT excluded.payload \
            OR {table}.parent_id IS NOT excluded.parent_id",
        table = kind.table()
    ))?;

    let mut changed = Vec::new();
    for record in records {
        let rows = stmt.execute(params![
            record.id,
            record.parent_id,
            record.payload,
            record.updated_at.to_rfc3339(),
        ])?;
        if rows > 0 {
            changed.push(record.id);
        }
    }
    Ok(changed)
}

fn delete_rows(conn: &Connection, kind: ResourceKind, ids: &[i64]) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(&format!("DELETE FROM {} WHERE id = ?1", kind.table()))?;
    let mut deleted = Vec::new();
    for id in ids {
        if stmt.execute([id])? > 0 {
            deleted.push(*id);
        }
    }
    Ok(deleted)
}

fn scoped_ids(conn: &Connection, kind: ResourceKind, scope: Scope) -> Result<BTreeSet<i64>> {
    let table = kind.table();
    let ids = match scope {
        Scope::All => {
            let mut stmt = conn.prepare_cached(&format!("SELECT id FROM {table}"))?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<BTreeSet<i64>>>()?
        }
        Scope::Parent(parent_id) => {
            let mut stmt =
                conn.prepare_cached(&format!("SELECT id FROM {table} WHERE parent_id = ?1"))?;
            stmt.query_map([parent_id], |row| row.get(0))?
                .collect::<rusqlite::Result<BTreeSet<i64>>>()?
        }
    };
    Ok(ids)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedRecord> {
    let updated_at: String = row.get(3)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(CachedRecord {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        payload: row.get(2)?,
        updated_at,
    })
}

fn to_sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl RecordStore for SqliteRecordStore {
    fn upsert(&self, kind: ResourceKind, records: &[CachedRecord]) -> Result<()> {
        let changed = {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            let changed = upsert_rows(&tx, kind, records)?;
            tx.commit()?;
            changed
        };
        notify(&self.changes, kind, changed, Vec::new());
        Ok(())
    }

    fn query(&self, kind: ResourceKind, query: &RecordQuery) -> Result<Vec<CachedRecord>> {
        let conn = self.lock();
        let limit = query.limit.map_or(-1, to_sql_count);
        let offset = to_sql_count(query.offset);
        let table = kind.table();

        let records = if let Some(parent_id) = query.parent_id {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT id, parent_id, payload, updated_at FROM {table} \
                 WHERE parent_id = ?1 ORDER BY id LIMIT ?2 OFFSET ?3"
            ))?;
            stmt.query_map(params![parent_id, limit, offset], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT id, parent_id, payload, updated_at FROM {table} \
                 ORDER BY id LIMIT ?1 OFFSET ?2"
            ))?;
            stmt.query_map(params![limit, offset], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(records)
    }

    fn get(&self, kind: ResourceKind, id: i64) -> Result<Option<CachedRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, parent_id, payload, updated_at FROM {} WHERE id = ?1",
            kind.table()
        ))?;
        Ok(stmt.query_row([id], row_to_record).optional()?)
    }

    fn ids(&self, kind: ResourceKind, scope: Scope) -> Result<BTreeSet<i64>> {
        scoped_ids(&self.lock(), kind, scope)
    }

    fn delete(&self, kind: ResourceKind, ids: &[i64]) -> Result<usize> {
        let deleted = {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            let deleted = delete_rows(&tx, kind, ids)?;
            tx.commit()?;
            deleted
        };
        let count = deleted.len();
        notify(&self.changes, kind, Vec::new(), deleted);
        Ok(count)
    }

    fn clear(&self, kind: ResourceKind) -> Result<usize> {
        let deleted = {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            let ids: Vec<i64> = scoped_ids(&tx, kind, Scope::All)?.into_iter().collect();
            tx.execute(&format!("DELETE FROM {}", kind.table()), [])?;
            tx.commit()?;
            ids
        };
        let count = deleted.len();
        notify(&self.changes, kind, Vec::new(), deleted);
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }

    fn reconcile(
        &self,
        kind: ResourceKind,
        scope: Scope,
        records: &[CachedRecord],
    ) -> Result<Reconciled> {
        let (changed, stale) = {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            let changed = upsert_rows(&tx, kind, records)?;
            let remote: BTreeSet<i64> = records.iter().map(|r| r.id).collect();
            let stale: Vec<i64> = scoped_ids(&tx, kind, scope)?
                .difference(&remote)
                .copied()
                .collect();
            delete_rows(&tx, kind, &stale)?;
            tx.commit()?;
            (changed, stale)
        };

        notify(&self.changes, kind, changed, stale.clone());
        Ok(Reconciled {
            upserted: records.iter().map(|r| r.id).collect(),
            stale,
        })
    }
}
