//! Push ingestion: turn client-captured completions and checklist updates
//! into ledger entries and projection changes.
//!
//! Each item runs in its own transaction. A failing item rolls back only
//! its own work and is reported in `errors`; the rest of the batch
//! proceeds. Duplicates (offline ID already in the ledger) are successful
//! no-op outcomes, never errors — the unique index on
//! `(tenant_id, offline_id)` is the authoritative dedupe signal, with the
//! pre-insert lookup as a fast path.

use rusqlite::Connection;
use tracing::debug;

use opsync_core::ids::now_iso;
use opsync_core::types::{ChecklistStatus, CompletionStatus};
use opsync_core::wire::{
    AckStatus, ChecklistAck, ChecklistAckStatus, ChecklistUpdate, ClientCompletion, CompletionAck,
    PushItemError, PushRequest, PushResponse,
};
use opsync_store::repositories::checklist::ChecklistRepository;
use opsync_store::repositories::completion::{CompletionRepository, NewCompletion};
use opsync_store::repositories::problem::ProblemRepository;
use opsync_store::repositories::task::TaskRepository;
use opsync_store::StoreError;

use crate::errors::codes;
use crate::notify::{NotificationDispatcher, SyncFact};
use crate::SyncContext;

/// Apply a push batch. Item failures land in the response's `errors`; the
/// call itself only fails on request-level problems, which for push means
/// never — handlers can treat the response as authoritative.
pub fn apply_push(
    conn: &Connection,
    ctx: &SyncContext,
    req: &PushRequest,
    dispatcher: &dyn NotificationDispatcher,
) -> PushResponse {
    let now = now_iso();
    let mut completions = Vec::with_capacity(req.completions.len());
    let mut checklist_updates = Vec::with_capacity(req.checklist_updates.len());
    let mut errors = Vec::new();
    let mut facts = Vec::new();

    for item in &req.completions {
        match apply_completion(conn, ctx, item, &now) {
            Ok((ack, mut new_facts)) => {
                completions.push(ack);
                facts.append(&mut new_facts);
            }
            Err(err) => errors.push(err),
        }
    }

    for update in &req.checklist_updates {
        match apply_checklist_update(conn, ctx, update, &now) {
            Ok((ack, mut new_facts)) => {
                checklist_updates.push(ack);
                facts.append(&mut new_facts);
            }
            Err(err) => errors.push(err),
        }
    }

    debug!(
        tenant_id = %ctx.tenant_id,
        accepted = completions.len(),
        updated = checklist_updates.len(),
        failed = errors.len(),
        "push applied"
    );

    // Committed work only — a rolled-back item never reaches a dispatcher.
    for fact in &facts {
        dispatcher.dispatch(fact);
    }

    PushResponse { completions, checklist_updates, errors, synced_at: now }
}

type ItemResult<T> = std::result::Result<(T, Vec<SyncFact>), PushItemError>;

fn apply_completion(
    conn: &Connection,
    ctx: &SyncContext,
    item: &ClientCompletion,
    now: &str,
) -> ItemResult<CompletionAck> {
    if item.offline_id.trim().is_empty() || item.task_id.trim().is_empty() {
        return Err(item_error(
            &item.offline_id,
            codes::VALIDATION_ERROR,
            "offlineId and taskId are required",
        ));
    }

    match CompletionRepository::find_by_offline_id(conn, &ctx.tenant_id, &item.offline_id) {
        Ok(Some(existing)) => {
            return Ok((duplicate_ack(&item.offline_id, existing.id), Vec::new()));
        }
        Ok(None) => {}
        Err(err) => return Err(store_item_error(&item.offline_id, &err)),
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|err| store_item_error(&item.offline_id, &StoreError::from(err)))?;

    let task = match TaskRepository::get_task(&tx, &ctx.tenant_id, &item.task_id) {
        Ok(Some(task)) => task,
        Ok(None) => {
            return Err(item_error(
                &item.offline_id,
                codes::NOT_FOUND,
                &format!("task {} not found", item.task_id),
            ));
        }
        Err(err) => return Err(store_item_error(&item.offline_id, &err)),
    };

    let record = match CompletionRepository::insert(
        &tx,
        &NewCompletion {
            tenant_id: &ctx.tenant_id,
            offline_id: &item.offline_id,
            task_id: &item.task_id,
            checklist_item_id: item.checklist_item_id.as_deref(),
            user_id: &ctx.user_id,
            status: item.status,
            notes: item.notes.as_deref(),
            photo_url: item.photo_url.as_deref(),
            completed_at: &item.completed_at,
            synced_at: now,
        },
    ) {
        Ok(record) => record,
        Err(err) if err.is_unique_violation() => {
            // Lost a race with a concurrent submit of the same offline ID.
            drop(tx);
            return raced_duplicate_ack(conn, ctx, &item.offline_id);
        }
        Err(err) => return Err(store_item_error(&item.offline_id, &err)),
    };

    let mut facts = Vec::new();

    if let Some(checklist_item_id) = item.checklist_item_id.as_deref() {
        let status = match item.status {
            CompletionStatus::Ok => ChecklistStatus::Ok,
            CompletionStatus::Problem => ChecklistStatus::Problem,
        };
        match ChecklistRepository::apply_status(
            &tx,
            &ctx.tenant_id,
            checklist_item_id,
            status,
            &ctx.user_id,
            item.problem_reason.as_deref(),
            now,
        ) {
            Ok(true) => {}
            Ok(false) => {
                return Err(item_error(
                    &item.offline_id,
                    codes::NOT_FOUND,
                    &format!("checklist item {checklist_item_id} not found"),
                ));
            }
            Err(err) => return Err(store_item_error(&item.offline_id, &err)),
        }

        // Checking the last pending item completes the parent task.
        let all_done = ChecklistRepository::all_items_done(&tx, &task.id)
            .map_err(|err| store_item_error(&item.offline_id, &err))?;
        if task.has_checklist && all_done {
            complete_task(&tx, ctx, &task.id, now, &mut facts)
                .map_err(|err| store_item_error(&item.offline_id, &err))?;
        }
    } else {
        // Whole-task completion. Server clock only; the client timestamp
        // went to the ledger as audit data.
        complete_task(&tx, ctx, &item.task_id, now, &mut facts)
            .map_err(|err| store_item_error(&item.offline_id, &err))?;
    }

    if item.status == CompletionStatus::Problem {
        let reason = item.problem_reason.as_deref().unwrap_or("other");
        let problem = ProblemRepository::create(
            &tx,
            &ctx.tenant_id,
            &record.id,
            &item.task_id,
            reason,
            item.notes.as_deref(),
        )
        .map_err(|err| store_item_error(&item.offline_id, &err))?;
        facts.push(SyncFact::ProblemReported {
            tenant_id: ctx.tenant_id.clone(),
            task_id: item.task_id.clone(),
            problem_id: problem.id,
            reason_category: reason.to_string(),
        });
    }

    tx.commit()
        .map_err(|err| store_item_error(&item.offline_id, &StoreError::from(err)))?;

    let ack = CompletionAck {
        offline_id: item.offline_id.clone(),
        server_id: record.id,
        status: AckStatus::Created,
    };
    Ok((ack, facts))
}

fn apply_checklist_update(
    conn: &Connection,
    ctx: &SyncContext,
    update: &ChecklistUpdate,
    now: &str,
) -> ItemResult<ChecklistAck> {
    if update.id.trim().is_empty() {
        return Err(item_error(&update.id, codes::VALIDATION_ERROR, "item id is required"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|err| store_item_error(&update.id, &StoreError::from(err)))?;

    let item = match ChecklistRepository::get_item(&tx, &ctx.tenant_id, &update.id) {
        Ok(Some(item)) => item,
        Ok(None) => {
            // Missing items are an ack outcome, not an error: the client
            // clears the update from its queue either way.
            let ack = ChecklistAck { id: update.id.clone(), status: ChecklistAckStatus::NotFound };
            return Ok((ack, Vec::new()));
        }
        Err(err) => return Err(store_item_error(&update.id, &err)),
    };

    let changed = ChecklistRepository::apply_status(
        &tx,
        &ctx.tenant_id,
        &update.id,
        update.status,
        &ctx.user_id,
        update.problem_reason.as_deref(),
        now,
    )
    .map_err(|err| store_item_error(&update.id, &err))?;
    if !changed {
        let ack = ChecklistAck { id: update.id.clone(), status: ChecklistAckStatus::NotFound };
        return Ok((ack, Vec::new()));
    }

    let mut facts = Vec::new();
    if update.status != ChecklistStatus::Pending {
        let parent = TaskRepository::get_task(&tx, &ctx.tenant_id, &item.task_id)
            .map_err(|err| store_item_error(&update.id, &err))?;
        let all_done = ChecklistRepository::all_items_done(&tx, &item.task_id)
            .map_err(|err| store_item_error(&update.id, &err))?;
        if parent.is_some_and(|t| t.has_checklist) && all_done {
            complete_task(&tx, ctx, &item.task_id, now, &mut facts)
                .map_err(|err| store_item_error(&update.id, &err))?;
        }
    }

    tx.commit()
        .map_err(|err| store_item_error(&update.id, &StoreError::from(err)))?;

    let ack = ChecklistAck { id: update.id.clone(), status: ChecklistAckStatus::Updated };
    Ok((ack, facts))
}

fn complete_task(
    conn: &Connection,
    ctx: &SyncContext,
    task_id: &str,
    now: &str,
    facts: &mut Vec<SyncFact>,
) -> opsync_store::Result<()> {
    if TaskRepository::mark_completed(conn, &ctx.tenant_id, task_id, &ctx.user_id, now)? {
        facts.push(SyncFact::TaskCompleted {
            tenant_id: ctx.tenant_id.clone(),
            task_id: task_id.to_string(),
            completed_by: ctx.user_id.clone(),
        });
    }
    Ok(())
}

fn duplicate_ack(offline_id: &str, server_id: String) -> CompletionAck {
    CompletionAck {
        offline_id: offline_id.to_string(),
        server_id,
        status: AckStatus::Duplicate,
    }
}

fn raced_duplicate_ack(
    conn: &Connection,
    ctx: &SyncContext,
    offline_id: &str,
) -> ItemResult<CompletionAck> {
    match CompletionRepository::find_by_offline_id(conn, &ctx.tenant_id, offline_id) {
        Ok(Some(existing)) => Ok((duplicate_ack(offline_id, existing.id), Vec::new())),
        Ok(None) => Err(item_error(
            offline_id,
            codes::STORE_ERROR,
            "duplicate insert raced but no ledger entry found",
        )),
        Err(err) => Err(store_item_error(offline_id, &err)),
    }
}

fn item_error(id: &str, code: &str, message: &str) -> PushItemError {
    PushItemError { id: id.to_string(), code: code.to_string(), error: message.to_string() }
}

fn store_item_error(id: &str, err: &StoreError) -> PushItemError {
    item_error(id, codes::STORE_ERROR, &err.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
