//! Wire-format DTOs for the sync protocol.
//!
//! Shared by the server handlers and the client offline queue so both sides
//! agree on one serde definition. All field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::types::{Area, ChecklistItem, ChecklistStatus, CompletionRecord, CompletionStatus, Task};

/// A completion captured on a client while offline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCompletion {
    /// Client-minted idempotency key, unique per tenant.
    pub offline_id: String,
    /// Target task.
    pub task_id: String,
    /// Checklist item, or `None` for a whole-task completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_item_id: Option<String>,
    /// Outcome.
    pub status: CompletionStatus,
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Opaque photo attachment key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Reason category when `status` is `problem`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_reason: Option<String>,
    /// Client-asserted capture timestamp (audit only).
    pub completed_at: String,
}

/// A direct checklist item mutation submitted alongside completions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistUpdate {
    /// Checklist item ID.
    pub id: String,
    /// New status.
    pub status: ChecklistStatus,
    /// Reason category when `status` is `problem`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_reason: Option<String>,
    /// Client-asserted timestamp (audit only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// `POST /sync/push` request body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Completions recorded while offline, in client-submission order.
    #[serde(default)]
    pub completions: Vec<ClientCompletion>,
    /// Direct checklist updates.
    #[serde(default)]
    pub checklist_updates: Vec<ChecklistUpdate>,
}

/// Per-completion outcome in a push response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// A new ledger entry was created.
    Created,
    /// The offline ID was already in the ledger — a successful no-op.
    Duplicate,
}

/// Acknowledgement for one pushed completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionAck {
    /// Echoed offline ID.
    pub offline_id: String,
    /// Server-assigned ledger ID.
    pub server_id: String,
    /// Created or duplicate.
    pub status: AckStatus,
}

/// Per-update outcome for checklist mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistAckStatus {
    /// The item was updated.
    Updated,
    /// No such item in this tenant.
    NotFound,
}

/// Acknowledgement for one checklist update.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistAck {
    /// Echoed item ID.
    pub id: String,
    /// Updated or not found.
    pub status: ChecklistAckStatus,
}

/// A per-item error. Items reported here stay queued client-side and are
/// safe to resubmit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushItemError {
    /// The offending `offlineId` (completions) or item `id` (checklist).
    pub id: String,
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub error: String,
}

/// `POST /sync/push` response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// One ack per accepted or deduplicated completion.
    pub completions: Vec<CompletionAck>,
    /// One ack per processed checklist update.
    pub checklist_updates: Vec<ChecklistAck>,
    /// Per-item failures. Never aborts the rest of the batch.
    pub errors: Vec<PushItemError>,
    /// Server time — clients feed this back as the next pull's
    /// `sinceTimestamp`.
    pub synced_at: String,
}

/// Entity families a pull may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Task rows with denormalized checklists.
    Tasks,
    /// Areas visible to the caller.
    Areas,
    /// Recent completion ledger entries.
    Completions,
}

/// `POST /sync/pull` request body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Incremental cursor: only rows strictly newer are returned.
    /// Omit for a full resync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_timestamp: Option<String>,
    /// Entity families to include. Omit for all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<EntityType>>,
    /// Restrict the pull to a single area. Non-privileged callers may only
    /// name areas they are members of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
}

/// A task with its checklist denormalized, so clients need no second
/// round trip.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithChecklist {
    /// The task row.
    #[serde(flatten)]
    pub task: Task,
    /// Checklist items ordered by `sortOrder`.
    pub checklist: Vec<ChecklistItem>,
}

/// `POST /sync/pull` response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Changed tasks, present when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TaskWithChecklist>>,
    /// Changed areas, present when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub areas: Option<Vec<Area>>,
    /// Recent completions (bounded slice), present when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<Vec<CompletionRecord>>,
    /// Server time at response construction. Clients **must** use this as
    /// the next call's `sinceTimestamp` — not a max of returned rows.
    pub synced_at: String,
}

/// `GET /sync/status` response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    /// Pending tasks visible to the caller.
    pub pending_task_count: i64,
    /// Current server time.
    pub server_time: String,
}
