//! `sync` and `cache` commands.

use std::fmt::Write as _;

use serde_json::Value;

use crate::cli::args::{CacheListArgs, SyncArgs};
use crate::cli::output::{OutputOptions, emit};
use crate::core::{Finsync, ResourceSyncManager, SyncReport};
use crate::error::{ApiError, ApiErrorKind, FinsyncError, Result};
use crate::models::{Resource, ResourceKind};
use crate::storage::{RecordQuery, RecordStore};

/// Resource argument selecting every family.
pub const ALL_FAMILIES: &str = "all";

/// Execute `sync <resource>`.
///
/// # Errors
///
/// Returns [`FinsyncError::NotAuthenticated`] without a stored session, or the
/// classified failure of the fetch.
pub async fn sync(sdk: &Finsync, args: &SyncArgs, out: OutputOptions) -> Result<()> {
    if args.resource.eq_ignore_ascii_case(ALL_FAMILIES) {
        return sync_everything(sdk, args, out).await;
    }
    let kind = ResourceKind::from_cli_name(&args.resource)?;
    if !sdk.is_authenticated() {
        return Err(FinsyncError::NotAuthenticated);
    }

    match kind {
        ResourceKind::Provider => sync_family(sdk, sdk.providers(), args, out).await,
        ResourceKind::ProviderAccount => sync_family(sdk, sdk.provider_accounts(), args, out).await,
        ResourceKind::Account => sync_family(sdk, sdk.accounts(), args, out).await,
        ResourceKind::Transaction => sync_family(sdk, sdk.transactions(), args, out).await,
        ResourceKind::Message => sync_family(sdk, sdk.messages(), args, out).await,
    }
}

/// `sync all`: every family, concurrently.
async fn sync_everything(sdk: &Finsync, args: &SyncArgs, out: OutputOptions) -> Result<()> {
    if args.parent.is_some() || args.id.is_some() {
        return Err(ApiError::new(
            ApiErrorKind::Validation,
            "--parent and --id need a single resource family",
        )
        .into());
    }
    if !sdk.is_authenticated() {
        return Err(FinsyncError::NotAuthenticated);
    }

    let mut reports = Vec::with_capacity(ResourceKind::ALL.len());
    for outcome in sdk.refresh_all_families().await {
        reports.push(super::settle_session(sdk, outcome)?);
    }
    emit(out, "sync", &reports, || {
        reports.iter().map(render_report).collect::<Vec<_>>().join("\n")
    })
}

async fn sync_family<R: Resource>(
    sdk: &Finsync,
    manager: ResourceSyncManager<R>,
    args: &SyncArgs,
    out: OutputOptions,
) -> Result<()> {
    if let Some(id) = args.id {
        let record = super::settle_session(sdk, manager.refresh_one(id).await)?;
        return emit(out, "sync", &record, || format!("Refreshed {} #{id}", R::KIND));
    }

    let outcome = match args.parent {
        Some(parent_id) => manager.refresh_all_in(parent_id).await,
        None => manager.refresh_all().await,
    };
    let report = super::settle_session(sdk, outcome)?;
    emit(out, "sync", &report, || render_report(&report))
}

fn render_report(report: &SyncReport) -> String {
    let scope = report
        .parent_id
        .map_or_else(String::new, |id| format!(" (parent {id})"));
    format!(
        "Synced {}{scope}: {} fetched, {} removed",
        report.resource,
        report.upserted.len(),
        report.stale.len()
    )
}

/// Execute `cache list <resource>`.
///
/// # Errors
///
/// Returns an error for an unknown family or a failed cache read.
pub fn cache_list(store: &dyn RecordStore, args: &CacheListArgs, out: OutputOptions) -> Result<()> {
    let kind = ResourceKind::from_cli_name(&args.resource)?;
    let query = RecordQuery {
        parent_id: args.parent,
        limit: args.limit,
        offset: args.offset,
    };
    let rows: Vec<Value> = store
        .query(kind, &query)?
        .iter()
        .map(|row| serde_json::from_str(&row.payload))
        .collect::<serde_json::Result<_>>()?;

    emit(out, "cache list", &rows, || render_rows(kind, &rows))
}

fn render_rows(kind: ResourceKind, rows: &[Value]) -> String {
    if rows.is_empty() {
        return format!("No cached {kind}. Run `finsync sync {kind}` first.");
    }
    let mut text = format!("{:<10} {:<10} {}\n", "ID", "PARENT", "SUMMARY");
    for row in rows {
        let id = row.get("id").and_then(Value::as_i64).unwrap_or_default();
        let parent = kind
            .parent_param()
            .and_then(|param| row.get(param))
            .and_then(Value::as_i64)
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        let _ = writeln!(text, "{id:<10} {parent:<10} {}", summary(row));
    }
    text.trim_end().to_string()
}

/// First descriptive field present in a record.
fn summary(row: &Value) -> &str {
    ["name", "account_name", "description", "title", "header"]
        .iter()
        .find_map(|field| row.get(*field).and_then(Value::as_str))
        .unwrap_or("")
}

/// Execute `cache clear [resource]`.
///
/// # Errors
///
/// Returns an error for an unknown family or a failed delete.
pub fn cache_clear(store: &dyn RecordStore, resource: Option<&str>, out: OutputOptions) -> Result<()> {
    let kinds: Vec<ResourceKind> = match resource {
        Some(name) => vec![ResourceKind::from_cli_name(name)?],
        None => ResourceKind::ALL.to_vec(),
    };

    let mut removed = serde_json::Map::new();
    let mut total = 0;
    for kind in kinds {
        let count = store.clear(kind)?;
        total += count;
        removed.insert(kind.cli_name().to_string(), Value::from(count));
    }

    emit(out, "cache clear", &removed, || format!("Removed {total} cached records."))
}
