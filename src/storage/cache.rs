//! Local record cache.
//!
//! [`RecordStore`] is the persistence seam behind every resource family. Rows
//! are opaque JSON payloads keyed by server id with an optional parent id, so
//! one implementation serves every family; [`ResourceKind`] picks the table.
//!
//! Stores broadcast a [`CacheChange`] after each mutation so live queries can
//! re-read without polling.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::ResourceKind;

/// Capacity of the change notification channel.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Types
// =============================================================================

/// One cached row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecord {
    pub id: i64,
    pub parent_id: Option<i64>,
    /// Serialized model.
    pub payload: String,
    pub updated_at: DateTime<Utc>,
}

/// Which rows of a family a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every row of the family.
    All,
    /// Only rows owned by this parent.
    Parent(i64),
}

impl Scope {
    #[must_use]
    pub const fn contains(self, parent_id: Option<i64>) -> bool {
        match self {
            Self::All => true,
            Self::Parent(p) => matches!(parent_id, Some(id) if id == p),
        }
    }
}

/// Read filter: optional parent, ordered by id, paged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub parent_id: Option<i64>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RecordQuery {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            parent_id: None,
            limit: None,
            offset: 0,
        }
    }

    #[must_use]
    pub const fn in_parent(parent_id: i64) -> Self {
        Self {
            parent_id: Some(parent_id),
            limit: None,
            offset: 0,
        }
    }

    #[must_use]
    pub const fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// Rows of one family changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheChange {
    pub kind: ResourceKind,
    pub upserted: Vec<i64>,
    pub deleted: Vec<i64>,
}

/// Result of reconciling a listing into the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Ids written from the listing.
    pub upserted: Vec<i64>,
    /// Ids removed because the listing no longer contains them.
    pub stale: Vec<i64>,
}

// =============================================================================
// Store Trait
// =============================================================================

/// Persistent cache of resource rows.
pub trait RecordStore: Send + Sync {
    /// Insert or fully replace rows by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; no row is changed in that case.
    fn upsert(&self, kind: ResourceKind, records: &[CachedRecord]) -> Result<()>;

    /// Rows matching `query`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn query(&self, kind: ResourceKind, query: &RecordQuery) -> Result<Vec<CachedRecord>>;

    /// A single row.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, kind: ResourceKind, id: i64) -> Result<Option<CachedRecord>>;

    /// Ids of every row within `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn ids(&self, kind: ResourceKind, scope: Scope) -> Result<BTreeSet<i64>>;

    /// Delete rows by id; returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&self, kind: ResourceKind, ids: &[i64]) -> Result<usize>;

    /// Delete every row of a family; returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn clear(&self, kind: ResourceKind) -> Result<usize>;

    /// Change notifications for every family.
    fn subscribe(&self) -> broadcast::Receiver<CacheChange>;

    /// Upsert a full listing, then delete rows in `scope` the listing omits.
    ///
    /// The default runs the steps one after another; stores with transactions
    /// override it to apply both atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    fn reconcile(
        &self,
        kind: ResourceKind,
        scope: Scope,
        records: &[CachedRecord],
    ) -> Result<Reconciled> {
        self.upsert(kind, records)?;
        let remote: BTreeSet<i64> = records.iter().map(|r| r.id).collect();
        let stale: Vec<i64> = self
            .ids(kind, scope)?
            .difference(&remote)
            .copied()
            .collect();
        self.delete(kind, &stale)?;
        Ok(Reconciled {
            upserted: records.iter().map(|r| r.id).collect(),
            stale,
        })
    }
}

/// Send a change, ignoring the no-subscriber case.
pub(crate) fn notify(
    sender: &broadcast::Sender<CacheChange>,
    kind: ResourceKind,
    upserted: Vec<i64>,
    deleted: Vec<i64>,
) {
    if upserted.is_empty() && deleted.is_empty() {
        return;
    }
    let _ = sender.send(CacheChange {
        kind,
        upserted,
        deleted,
    });
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Non-persistent store. Uses the sequential default for `reconcile`.
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<ResourceKind, BTreeMap<i64, CachedRecord>>>,
    changes: broadcast::Sender<CacheChange>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            tables: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceKind, BTreeMap<i64, CachedRecord>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryRecordStore {
    fn upsert(&self, kind: ResourceKind, records: &[CachedRecord]) -> Result<()> {
        let mut changed = Vec::new();
        {
            let mut tables = self.lock();
            let table = tables.entry(kind).or_default();
            for record in records {
                let same = table.get(&record.id).is_some_and(|existing| {
                    existing.payload == record.payload && existing.parent_id == record.parent_id
                });
                if !same {
                    table.insert(record.id, record.clone());
                    changed.push(record.id);
                }
            }
        }
        notify(&self.changes, kind, changed, Vec::new());
        Ok(())
    }

    fn query(&self, kind: ResourceKind, query: &RecordQuery) -> Result<Vec<CachedRecord>> {
        let tables = self.lock();
        let Some(table) = tables.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(table
            .values()
            .filter(|r| query.parent_id.is_none() || r.parent_id == query.parent_id)
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn get(&self, kind: ResourceKind, id: i64) -> Result<Option<CachedRecord>> {
        Ok(self.lock().get(&kind).and_then(|t| t.get(&id)).cloned())
    }

    fn ids(&self, kind: ResourceKind, scope: Scope) -> Result<BTreeSet<i64>> {
        Ok(self.lock().get(&kind).map_or_else(BTreeSet::new, |table| {
            table
                .values()
                .filter(|r| scope.contains(r.parent_id))
                .map(|r| r.id)
                .collect()
        }))
    }

    fn delete(&self, kind: ResourceKind, ids: &[i64]) -> Result<usize> {
        let deleted: Vec<i64> = {
            let mut tables = self.lock();
            tables.get_mut(&kind).map_or_else(Vec::new, |table| {
                ids.iter()
                    .copied()
                    .filter(|id| table.remove(id).is_some())
                    .collect()
            })
        };
        let count = deleted.len();
        notify(&self.changes, kind, Vec::new(), deleted);
        Ok(count)
    }

    fn clear(&self, kind: ResourceKind) -> Result<usize> {
        let deleted: Vec<i64> = self
            .lock()
            .remove(&kind)
            .map_or_else(Vec::new, |table| table.into_keys().collect());
        let count = deleted.len();
        notify(&self.changes, kind, Vec::new(), deleted);
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }
}
