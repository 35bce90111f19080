//! Remote-to-local synchronisation for one resource family.
//!
//! A [`ResourceSyncManager`] fetches listings through the authenticated
//! transport and reconciles them into the [`RecordStore`]: every listed record
//! is upserted, then local records in the same scope that the listing no
//! longer contains are deleted. A failed fetch never touches the cache.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::http::{ApiRequest, Transport};
use super::result::{ApiResult, into_result, into_unit_result};
use crate::error::{ApiError, ApiErrorKind, Result};
use crate::models::{Resource, ResourceKind};
use crate::storage::{CachedRecord, RecordQuery, RecordStore, Scope};

/// What one reconciliation changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub resource: &'static str,
    /// Parent the listing was scoped to, if any.
    pub parent_id: Option<i64>,
    /// Ids in the remote listing (all upserted).
    pub upserted: Vec<i64>,
    /// Local ids evicted because the listing omitted them.
    pub stale: Vec<i64>,
}

/// Fetches and caches one resource family.
pub struct ResourceSyncManager<R: Resource> {
    transport: Arc<dyn Transport>,
    store: Arc<dyn RecordStore>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for ResourceSyncManager<R> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> std::fmt::Debug for ResourceSyncManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSyncManager")
            .field("resource", &R::KIND)
            .finish_non_exhaustive()
    }
}

fn local_failure(context: &str, err: impl std::fmt::Display) -> ApiError {
    ApiError::new(ApiErrorKind::Unknown, format!("{context}: {err}"))
}

impl<R: Resource> ResourceSyncManager<R> {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            transport,
            store,
            _resource: PhantomData,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        R::KIND
    }

    // =========================================================================
    // Remote operations
    // =========================================================================

    /// Fetch the full listing and reconcile the whole family.
    pub async fn refresh_all(&self) -> ApiResult<SyncReport> {
        self.refresh_scope(Scope::All).await
    }

    /// Fetch the listing for one parent and reconcile only that parent's rows.
    pub async fn refresh_all_in(&self, parent_id: i64) -> ApiResult<SyncReport> {
        self.refresh_scope(Scope::Parent(parent_id)).await
    }

    async fn refresh_scope(&self, scope: Scope) -> ApiResult<SyncReport> {
        let mut request = ApiRequest::get(R::KIND.path());
        let parent_id = match scope {
            Scope::All => None,
            Scope::Parent(parent_id) => {
                let Some(param) = R::KIND.parent_param() else {
                    return ApiResult::Error(ApiError::new(
                        ApiErrorKind::Validation,
                        format!("{} cannot be listed by parent", R::KIND),
                    ));
                };
                request = request.with_query(param, parent_id);
                Some(parent_id)
            }
        };

        debug!(resource = %R::KIND, ?parent_id, "Fetching listing");
        let records: Vec<R> = match into_result(self.transport.send(&request).await) {
            ApiResult::Success(records) => records,
            ApiResult::Error(e) => {
                warn!(resource = %R::KIND, ?parent_id, kind = %e.kind, "Listing failed; cache left unchanged");
                return ApiResult::Error(e);
            }
            ApiResult::Loading => return ApiResult::Loading,
        };

        let rows = match to_rows(&records) {
            Ok(rows) => rows,
            Err(e) => return ApiResult::Error(e),
        };

        match self.store.reconcile(R::KIND, scope, &rows) {
            Ok(outcome) => {
                info!(
                    resource = %R::KIND,
                    ?parent_id,
                    fetched = outcome.upserted.len(),
                    stale = outcome.stale.len(),
                    "Cache reconciled"
                );
                ApiResult::Success(SyncReport {
                    resource: R::KIND.cli_name(),
                    parent_id,
                    upserted: outcome.upserted,
                    stale: outcome.stale,
                })
            }
            Err(e) => ApiResult::Error(local_failure("update local cache", e)),
        }
    }

    /// Fetch one record and upsert it.
    pub async fn refresh_one(&self, id: i64) -> ApiResult<R> {
        let request = ApiRequest::get(format!("{}/{id}", R::KIND.path()));
        let record: R = match into_result(self.transport.send(&request).await) {
            ApiResult::Success(record) => record,
            other => return other,
        };

        let rows = match to_rows(std::slice::from_ref(&record)) {
            Ok(rows) => rows,
            Err(e) => return ApiResult::Error(e),
        };
        if let Err(e) = self.store.upsert(R::KIND, &rows) {
            return ApiResult::Error(local_failure("update local cache", e));
        }
        debug!(resource = %R::KIND, id, "Record refreshed");
        ApiResult::Success(record)
    }

    /// Delete one record remotely, then locally.
    pub async fn delete_one(&self, id: i64) -> ApiResult<()> {
        let request = ApiRequest::delete(format!("{}/{id}", R::KIND.path()));
        match into_unit_result(self.transport.send(&request).await) {
            ApiResult::Success(()) => match self.store.delete(R::KIND, &[id]) {
                Ok(_) => {
                    debug!(resource = %R::KIND, id, "Record deleted");
                    ApiResult::Success(())
                }
                Err(e) => ApiResult::Error(local_failure("update local cache", e)),
            },
            other => other,
        }
    }

    // =========================================================================
    // Host flavours
    // =========================================================================

    /// Run [`Self::refresh_all`] in the background and hand the outcome to `completion`.
    pub fn spawn_refresh_all<F>(&self, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(ApiResult<SyncReport>) + Send + 'static,
    {
        let manager = self.clone();
        tokio::spawn(async move {
            completion(manager.refresh_all().await);
        })
    }

    /// Run [`Self::refresh_all`] in the background; the receiver starts at `Loading`.
    #[must_use]
    pub fn observe_refresh_all(&self) -> watch::Receiver<ApiResult<SyncReport>> {
        let (sender, receiver) = watch::channel(ApiResult::Loading);
        let manager = self.clone();
        tokio::spawn(async move {
            let _ = sender.send(manager.refresh_all().await);
        });
        receiver
    }

    // =========================================================================
    // Cache reads
    // =========================================================================

    /// Every cached record, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails or a row does not decode.
    pub fn cached_all(&self) -> Result<Vec<R>> {
        self.cached_matching(&RecordQuery::all())
    }

    /// Cached records matching `query`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails or a row does not decode.
    pub fn cached_matching(&self, query: &RecordQuery) -> Result<Vec<R>> {
        read_rows(self.store.as_ref(), query)
    }

    /// One cached record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails or the row does not decode.
    pub fn cached(&self, id: i64) -> Result<Option<R>> {
        self.store
            .get(R::KIND, id)?
            .map(|row| serde_json::from_str(&row.payload).map_err(Into::into))
            .transpose()
    }

    /// Observable view of cached records matching `query`.
    ///
    /// The receiver holds the current rows and is updated whenever this
    /// family's rows change. The background task ends when the receiver is
    /// dropped. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial read fails.
    pub fn live(&self, query: RecordQuery) -> Result<watch::Receiver<Vec<R>>> {
        let mut changes = self.store.subscribe();
        let initial = read_rows::<R>(self.store.as_ref(), &query)?;
        let (sender, receiver) = watch::channel(initial);
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = sender.closed() => break,
                    change = changes.recv() => match change {
                        Ok(change) if change.kind != R::KIND => {}
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            match read_rows::<R>(store.as_ref(), &query) {
                                Ok(rows) => {
                                    if sender.send(rows).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!(resource = %R::KIND, error = %e, "Live query read failed"),
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(resource = %R::KIND, "Live query ended");
        });

        Ok(receiver)
    }
}

fn to_rows<R: Resource>(records: &[R]) -> std::result::Result<Vec<CachedRecord>, ApiError> {
    let now = Utc::now();
    records
        .iter()
        .map(|record| {
            Ok(CachedRecord {
                id: record.id(),
                parent_id: record.parent_id(),
                payload: serde_json::to_string(record)
                    .map_err(|e| local_failure("encode record", e))?,
                updated_at: now,
            })
        })
        .collect()
}

fn read_rows<R: Resource>(store: &dyn RecordStore, query: &RecordQuery) -> Result<Vec<R>> {
    store
        .query(R::KIND, query)?
        .iter()
        .map(|row| serde_json::from_str(&row.payload).map_err(Into::into))
        .collect()
}
