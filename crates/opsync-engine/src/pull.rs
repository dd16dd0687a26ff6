//! Pull assembly: incremental, scope-restricted snapshots for clients.
//!
//! `synced_at` is captured before any query runs and trails the server
//! clock by one second; rows written while the response is assembled may
//! be delivered twice, never lost. Clients feed `synced_at` back verbatim
//! as the next `sinceTimestamp`.

use rusqlite::Connection;

use opsync_core::ids::now_iso;
use opsync_core::wire::{EntityType, PullRequest, PullResponse, SyncStatusResponse, TaskWithChecklist};
use opsync_store::repositories::area::AreaRepository;
use opsync_store::repositories::checklist::ChecklistRepository;
use opsync_store::repositories::completion::CompletionRepository;
use opsync_store::repositories::task::{TaskRepository, TaskScope};

use crate::errors::{EngineError, Result};
use crate::SyncContext;

/// Upper bound on completions per pull. Larger backlogs catch up over
/// repeated pulls instead of one giant payload.
pub const COMPLETIONS_PULL_CAP: u32 = 500;

/// Assemble a pull response for the caller's scope.
///
/// Non-privileged callers see tasks in their areas or assigned to them,
/// and only the ledger entries for those tasks (plus their own); naming
/// an `area_id` outside their membership is a scope violation and aborts
/// the whole request.
pub fn pull(conn: &Connection, ctx: &SyncContext, req: &PullRequest) -> Result<PullResponse> {
    let synced_at = cursor_timestamp();
    let since = req.since_timestamp.as_deref();

    let membership = if ctx.role.is_privileged() {
        None
    } else {
        Some(AreaRepository::list_user_area_ids(conn, &ctx.tenant_id, &ctx.user_id)?)
    };

    let scope = match (&req.area_id, &membership) {
        (Some(area_id), Some(areas)) => {
            if !areas.contains(area_id) {
                return Err(EngineError::ScopeViolation(format!(
                    "area {area_id} is outside the caller's membership"
                )));
            }
            TaskScope::Area(area_id.clone())
        }
        (Some(area_id), None) => TaskScope::Area(area_id.clone()),
        (None, Some(areas)) => {
            TaskScope::Restricted { area_ids: areas.clone(), user_id: ctx.user_id.clone() }
        }
        (None, None) => TaskScope::Tenant,
    };

    let wants =
        |entity: EntityType| req.entity_types.as_ref().is_none_or(|ts| ts.contains(&entity));

    let tasks = if wants(EntityType::Tasks) {
        let rows = TaskRepository::list_updated_since(conn, &ctx.tenant_id, since, &scope)?;
        let mut out = Vec::with_capacity(rows.len());
        for task in rows {
            let checklist = if task.has_checklist {
                ChecklistRepository::list_for_task(conn, &task.id)?
            } else {
                Vec::new()
            };
            out.push(TaskWithChecklist { task, checklist });
        }
        Some(out)
    } else {
        None
    };

    let areas = if wants(EntityType::Areas) {
        let restrict: Option<Vec<String>> = match (&req.area_id, &membership) {
            (Some(area_id), _) => Some(vec![area_id.clone()]),
            (None, Some(member_of)) => Some(member_of.clone()),
            (None, None) => None,
        };
        Some(AreaRepository::list_updated_since(conn, &ctx.tenant_id, since, restrict.as_deref())?)
    } else {
        None
    };

    let completions = if wants(EntityType::Completions) {
        // The ledger slice follows the same containment as tasks.
        Some(CompletionRepository::list_since(
            conn,
            &ctx.tenant_id,
            since,
            &scope,
            COMPLETIONS_PULL_CAP,
        )?)
    } else {
        None
    };

    Ok(PullResponse { tasks, areas, completions, synced_at })
}

/// The cursor handed back as `synced_at`. Timestamps have one-second
/// resolution and the since filter is strict, so a cursor equal to the
/// current second would silently drop rows stamped while this response
/// was being assembled. Trailing by one second turns that boundary into
/// a re-delivery.
fn cursor_timestamp() -> String {
    (chrono::Utc::now() - chrono::Duration::seconds(1))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Lightweight probe: how much pending work does the caller see, and what
/// time does the server think it is.
pub fn sync_status(conn: &Connection, ctx: &SyncContext) -> Result<SyncStatusResponse> {
    let scope = if ctx.role.is_privileged() {
        TaskScope::Tenant
    } else {
        let area_ids = AreaRepository::list_user_area_ids(conn, &ctx.tenant_id, &ctx.user_id)?;
        TaskScope::Restricted { area_ids, user_id: ctx.user_id.clone() }
    };
    let pending_task_count = TaskRepository::count_pending(conn, &ctx.tenant_id, &scope)?;
    Ok(SyncStatusResponse { pending_task_count, server_time: now_iso() })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
