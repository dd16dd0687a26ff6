//! Durable offline outbox.
//!
//! Every completion captured in the field is persisted locally before any
//! network attempt. Each row moves `pending → synced` once the gateway
//! acknowledges it (created or duplicate, both terminal); rejected rows
//! stay pending with an incremented retry counter. The `offline_id` is
//! minted here, at capture time, and is the idempotency key the server
//! dedupes on, so resubmitting after a crash or timeout is always safe.

use chrono::Utc;
use rusqlite::params;

use opsync_core::ids::{new_offline_id, now_iso};
use opsync_core::types::CompletionStatus;
use opsync_core::wire::ClientCompletion;
use opsync_store::{ConnectionPool, StoreError};

use crate::errors::Result;

/// Default retention for acknowledged rows, in days.
pub const SYNCED_RETENTION_DAYS: i64 = 7;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS outbox (
    offline_id   TEXT PRIMARY KEY,
    payload      TEXT NOT NULL,
    state        TEXT NOT NULL DEFAULT 'pending',
    retry_count  INTEGER NOT NULL DEFAULT 0,
    last_error   TEXT,
    captured_at  TEXT NOT NULL,
    synced_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_outbox_state ON outbox(state, captured_at);
";

/// What the user actually records; the queue fills in identity and time.
#[derive(Clone, Debug, Default)]
pub struct CompletionDraft {
    /// Task being completed.
    pub task_id: String,
    /// Checklist item, when this is an item-level completion.
    pub checklist_item_id: Option<String>,
    /// Outcome.
    pub status: CompletionStatus,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Attached photo reference.
    pub photo_url: Option<String>,
    /// Problem reason category, when `status` is `problem`.
    pub problem_reason: Option<String>,
}

/// A queued row as read back from the outbox.
#[derive(Clone, Debug)]
pub struct QueuedCompletion {
    /// The wire payload, exactly as it will be pushed.
    pub completion: ClientCompletion,
    /// Failed push attempts so far.
    pub retry_count: u32,
    /// Last gateway or transport error, if any.
    pub last_error: Option<String>,
    /// When the row was captured.
    pub captured_at: String,
}

/// The device-local offline queue.
pub struct OfflineQueue {
    pool: ConnectionPool,
    device_id: String,
}

impl OfflineQueue {
    /// Open the queue over a local pool, creating the outbox table if
    /// needed.
    pub fn open(pool: ConnectionPool, device_id: impl Into<String>) -> Result<Self> {
        {
            let conn = pool.get().map_err(StoreError::from)?;
            conn.execute_batch(SCHEMA).map_err(StoreError::from)?;
        }
        Ok(Self { pool, device_id: device_id.into() })
    }

    /// Persist a capture and mint its `offline_id`. The row is durable
    /// before this returns; the network comes later.
    pub fn capture(&self, draft: &CompletionDraft) -> Result<ClientCompletion> {
        let now = Utc::now();
        let completion = ClientCompletion {
            offline_id: new_offline_id(&self.device_id, now.timestamp()),
            task_id: draft.task_id.clone(),
            checklist_item_id: draft.checklist_item_id.clone(),
            status: draft.status,
            notes: draft.notes.clone(),
            photo_url: draft.photo_url.clone(),
            problem_reason: draft.problem_reason.clone(),
            completed_at: now_iso(),
        };
        let payload = serde_json::to_string(&completion)?;

        let conn = self.pool.get().map_err(StoreError::from)?;
        let _ = conn
            .execute(
                "INSERT INTO outbox (offline_id, payload, captured_at) VALUES (?1, ?2, ?3)",
                params![completion.offline_id, payload, completion.completed_at],
            )
            .map_err(StoreError::from)?;
        Ok(completion)
    }

    /// Pending rows in capture order, up to `limit`.
    pub fn pending(&self, limit: u32) -> Result<Vec<QueuedCompletion>> {
        let conn = self.pool.get().map_err(StoreError::from)?;
        let mut stmt = conn
            .prepare(
                "SELECT payload, retry_count, last_error, captured_at
                 FROM outbox WHERE state = 'pending'
                 ORDER BY captured_at, offline_id LIMIT ?1",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get_unwrap::<_, String>(0),
                    row.get_unwrap::<_, u32>(1),
                    row.get_unwrap::<_, Option<String>>(2),
                    row.get_unwrap::<_, String>(3),
                ))
            })
            .map_err(StoreError::from)?;

        let mut out = Vec::new();
        for row in rows {
            let (payload, retry_count, last_error, captured_at) = row.map_err(StoreError::from)?;
            out.push(QueuedCompletion {
                completion: serde_json::from_str(&payload)?,
                retry_count,
                last_error,
                captured_at,
            });
        }
        Ok(out)
    }

    /// Number of rows still awaiting an ack.
    pub fn pending_count(&self) -> Result<i64> {
        let conn = self.pool.get().map_err(StoreError::from)?;
        let count = conn
            .query_row("SELECT COUNT(*) FROM outbox WHERE state = 'pending'", [], |row| {
                row.get(0)
            })
            .map_err(StoreError::from)?;
        Ok(count)
    }

    /// Mark a row acknowledged. Terminal; the row is kept for the
    /// retention window, then purged.
    pub fn mark_synced(&self, offline_id: &str) -> Result<()> {
        let conn = self.pool.get().map_err(StoreError::from)?;
        let _ = conn
            .execute(
                "UPDATE outbox SET state = 'synced', synced_at = ?1, last_error = NULL
                 WHERE offline_id = ?2",
                params![now_iso(), offline_id],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// Record a failed attempt; the row stays pending for the next flush.
    pub fn record_failure(&self, offline_id: &str, error: &str) -> Result<()> {
        let conn = self.pool.get().map_err(StoreError::from)?;
        let _ = conn
            .execute(
                "UPDATE outbox SET retry_count = retry_count + 1, last_error = ?1
                 WHERE offline_id = ?2",
                params![error, offline_id],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Drop synced rows older than `retention_days`. Housekeeping only;
    /// the server's ledger is the durable record.
    pub fn purge_synced(&self, retention_days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::days(retention_days))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let conn = self.pool.get().map_err(StoreError::from)?;
        let purged = conn
            .execute(
                "DELETE FROM outbox WHERE state = 'synced' AND synced_at < ?1",
                params![cutoff],
            )
            .map_err(StoreError::from)?;
        Ok(purged)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use opsync_store::connection::{new_file, ConnectionConfig};

    fn open_queue() -> (OfflineQueue, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.db");
        let pool = new_file(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
        (OfflineQueue::open(pool, "dev1").unwrap(), dir)
    }

    fn draft(task_id: &str) -> CompletionDraft {
        CompletionDraft { task_id: task_id.into(), ..Default::default() }
    }

    #[test]
    fn capture_is_durable_and_pending() {
        let (queue, _dir) = open_queue();
        let stored = queue.capture(&draft("task-1")).unwrap();
        assert!(stored.offline_id.starts_with("dev1-"));

        let pending = queue.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].completion.task_id, "task-1");
        assert_eq!(pending[0].retry_count, 0);
        assert_eq!(queue.pending_count().unwrap(), 1);
    }

    #[test]
    fn captures_in_same_second_get_distinct_ids() {
        let (queue, _dir) = open_queue();
        let a = queue.capture(&draft("task-1")).unwrap();
        let b = queue.capture(&draft("task-1")).unwrap();
        assert_ne!(a.offline_id, b.offline_id);
        assert_eq!(queue.pending_count().unwrap(), 2);
    }

    #[test]
    fn mark_synced_is_terminal() {
        let (queue, _dir) = open_queue();
        let stored = queue.capture(&draft("task-1")).unwrap();
        queue.mark_synced(&stored.offline_id).unwrap();

        assert_eq!(queue.pending_count().unwrap(), 0);
        assert!(queue.pending(10).unwrap().is_empty());
    }

    #[test]
    fn record_failure_keeps_row_pending_with_counter() {
        let (queue, _dir) = open_queue();
        let stored = queue.capture(&draft("task-1")).unwrap();
        queue.record_failure(&stored.offline_id, "task not found").unwrap();
        queue.record_failure(&stored.offline_id, "task not found").unwrap();

        let pending = queue.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("task not found"));
    }

    #[test]
    fn purge_only_touches_old_synced_rows() {
        let (queue, _dir) = open_queue();
        let synced = queue.capture(&draft("task-1")).unwrap();
        let _still_pending = queue.capture(&draft("task-2")).unwrap();
        queue.mark_synced(&synced.offline_id).unwrap();

        // Fresh synced rows survive the retention window.
        assert_eq!(queue.purge_synced(SYNCED_RETENTION_DAYS).unwrap(), 0);
        // A zero-day window reaps nothing either: synced_at is "now",
        // not strictly before the cutoff.
        {
            let conn = queue.pool.get().unwrap();
            conn.execute(
                "UPDATE outbox SET synced_at = '2020-01-01T00:00:00Z' WHERE state = 'synced'",
                [],
            )
            .unwrap();
        }
        assert_eq!(queue.purge_synced(SYNCED_RETENTION_DAYS).unwrap(), 1);
        assert_eq!(queue.pending_count().unwrap(), 1);
    }

    #[test]
    fn pending_respects_capture_order_and_limit() {
        let (queue, _dir) = open_queue();
        for n in 0..5 {
            queue.capture(&draft(&format!("task-{n}"))).unwrap();
        }
        let page = queue.pending(3).unwrap();
        assert_eq!(page.len(), 3);
    }
}
