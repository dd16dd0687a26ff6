//! The completion ledger: append-only facts, deduped on
//! `(tenant_id, offline_id)`.

use rusqlite::{params, Connection, OptionalExtension};

use opsync_core::ids::generate_id;
use opsync_core::types::{CompletionRecord, CompletionStatus};

use crate::errors::Result;
use crate::repositories::task::TaskScope;

/// Parameters for appending one ledger entry.
#[derive(Clone, Debug)]
pub struct NewCompletion<'a> {
    /// Owning tenant.
    pub tenant_id: &'a str,
    /// Client-minted idempotency key.
    pub offline_id: &'a str,
    /// Target task.
    pub task_id: &'a str,
    /// Checklist item, or `None` for a whole-task completion.
    pub checklist_item_id: Option<&'a str>,
    /// Who did it.
    pub user_id: &'a str,
    /// Outcome.
    pub status: CompletionStatus,
    /// Free-text notes.
    pub notes: Option<&'a str>,
    /// Opaque photo attachment key.
    pub photo_url: Option<&'a str>,
    /// Client-asserted capture timestamp (audit only).
    pub completed_at: &'a str,
    /// Server receipt timestamp.
    pub synced_at: &'a str,
}

/// Completion ledger repository. Insert and read only — the ledger is never
/// updated or deleted in normal operation.
pub struct CompletionRepository;

impl CompletionRepository {
    /// Look up an entry by its idempotency key.
    ///
    /// This is an optimization: the unique index on
    /// `(tenant_id, offline_id)` remains the source of truth, and a
    /// constraint violation on insert is the authoritative duplicate signal.
    pub fn find_by_offline_id(
        conn: &Connection,
        tenant_id: &str,
        offline_id: &str,
    ) -> Result<Option<CompletionRecord>> {
        let record = conn
            .query_row(
                "SELECT * FROM completions WHERE tenant_id = ?1 AND offline_id = ?2",
                params![tenant_id, offline_id],
                |row| Ok(record_from_row(row)),
            )
            .optional()?;
        Ok(record)
    }

    /// Append one entry. Fails with a constraint violation when the
    /// `(tenant_id, offline_id)` pair already exists.
    pub fn insert(conn: &Connection, new: &NewCompletion<'_>) -> Result<CompletionRecord> {
        let id = generate_id("cmp");
        let _ = conn.execute(
            "INSERT INTO completions (id, tenant_id, offline_id, task_id, checklist_item_id,
             user_id, status, notes, photo_url, completed_at, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                new.tenant_id,
                new.offline_id,
                new.task_id,
                new.checklist_item_id,
                new.user_id,
                new.status.as_sql(),
                new.notes,
                new.photo_url,
                new.completed_at,
                new.synced_at,
            ],
        )?;
        Ok(CompletionRecord {
            id,
            tenant_id: new.tenant_id.to_string(),
            offline_id: new.offline_id.to_string(),
            task_id: new.task_id.to_string(),
            checklist_item_id: new.checklist_item_id.map(String::from),
            user_id: new.user_id.to_string(),
            status: new.status,
            notes: new.notes.map(String::from),
            photo_url: new.photo_url.map(String::from),
            completed_at: new.completed_at.to_string(),
            synced_at: new.synced_at.to_string(),
        })
    }

    /// Recent completions for a tenant, strictly newer than `since`,
    /// newest first, capped at `limit`. Large deltas are expected to be
    /// caught up over repeated pulls, not one giant payload.
    ///
    /// Visibility follows the same containment as tasks: a restricted
    /// caller sees entries for tasks in their areas or assigned to them,
    /// plus entries they wrote themselves. Ledger facts whose task has
    /// since been deleted stay visible to their author.
    pub fn list_since(
        conn: &Connection,
        tenant_id: &str,
        since: Option<&str>,
        scope: &TaskScope,
        limit: u32,
    ) -> Result<Vec<CompletionRecord>> {
        let mut conditions = vec!["c.tenant_id = ?".to_string()];
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(tenant_id.to_string())];
        if let Some(since) = since {
            conditions.push("c.completed_at > ?".to_string());
            values.push(Box::new(since.to_string()));
        }
        match scope {
            TaskScope::Tenant => {}
            TaskScope::Area(area_id) => {
                conditions.push("t.area_id = ?".to_string());
                values.push(Box::new(area_id.clone()));
            }
            TaskScope::Restricted { area_ids, user_id } => {
                let mut clauses =
                    vec!["c.user_id = ?".to_string(), "t.assignee_id = ?".to_string()];
                values.push(Box::new(user_id.clone()));
                values.push(Box::new(user_id.clone()));
                if !area_ids.is_empty() {
                    let placeholders = vec!["?"; area_ids.len()].join(", ");
                    clauses.push(format!("t.area_id IN ({placeholders})"));
                    for area in area_ids {
                        values.push(Box::new(area.clone()));
                    }
                }
                conditions.push(format!("({})", clauses.join(" OR ")));
            }
        }
        values.push(Box::new(limit));

        let sql = format!(
            "SELECT c.* FROM completions c LEFT JOIN tasks t ON t.id = c.task_id
             WHERE {} ORDER BY c.completed_at DESC, c.id DESC LIMIT ?",
            conditions.join(" AND ")
        );
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(param_refs.as_slice(), |row| Ok(record_from_row(row)))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(records)
    }

    /// Total entries for a task (all devices, all users).
    pub fn count_for_task(conn: &Connection, task_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM completions WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> CompletionRecord {
    let status_str: String = row.get_unwrap("status");
    CompletionRecord {
        id: row.get_unwrap("id"),
        tenant_id: row.get_unwrap("tenant_id"),
        offline_id: row.get_unwrap("offline_id"),
        task_id: row.get_unwrap("task_id"),
        checklist_item_id: row.get_unwrap("checklist_item_id"),
        user_id: row.get_unwrap("user_id"),
        status: CompletionStatus::from_sql(&status_str).unwrap_or(CompletionStatus::Ok),
        notes: row.get_unwrap("notes"),
        photo_url: row.get_unwrap("photo_url"),
        completed_at: row.get_unwrap("completed_at"),
        synced_at: row.get_unwrap("synced_at"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::repositories::task::{TaskCreateParams, TaskRepository};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn new_completion<'a>(offline_id: &'a str, completed_at: &'a str) -> NewCompletion<'a> {
        NewCompletion {
            tenant_id: "t1",
            offline_id,
            task_id: "task-1",
            checklist_item_id: None,
            user_id: "u1",
            status: CompletionStatus::Ok,
            notes: None,
            photo_url: None,
            completed_at,
            synced_at: "2025-06-01T10:00:05Z",
        }
    }

    #[test]
    fn insert_and_find_by_offline_id() {
        let conn = setup_db();
        let rec =
            CompletionRepository::insert(&conn, &new_completion("off-1", "2025-06-01T10:00:00Z"))
                .unwrap();
        assert!(rec.id.starts_with("cmp-"));

        let found = CompletionRepository::find_by_offline_id(&conn, "t1", "off-1")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, rec.id);
        assert_eq!(found.completed_at, "2025-06-01T10:00:00Z");
        assert_eq!(found.synced_at, "2025-06-01T10:00:05Z");
    }

    #[test]
    fn duplicate_offline_id_violates_constraint() {
        let conn = setup_db();
        CompletionRepository::insert(&conn, &new_completion("off-1", "2025-06-01T10:00:00Z"))
            .unwrap();
        let err = CompletionRepository::insert(&conn, &new_completion("off-1", "2025-06-01T10:00:00Z"))
            .unwrap_err();
        assert!(err.is_unique_violation(), "expected unique violation, got {err}");
    }

    #[test]
    fn same_offline_id_different_tenant_is_allowed() {
        let conn = setup_db();
        CompletionRepository::insert(&conn, &new_completion("off-1", "2025-06-01T10:00:00Z"))
            .unwrap();
        let mut other = new_completion("off-1", "2025-06-01T10:00:00Z");
        other.tenant_id = "t2";
        CompletionRepository::insert(&conn, &other).unwrap();
    }

    #[test]
    fn find_is_tenant_scoped() {
        let conn = setup_db();
        CompletionRepository::insert(&conn, &new_completion("off-1", "2025-06-01T10:00:00Z"))
            .unwrap();
        assert!(CompletionRepository::find_by_offline_id(&conn, "t2", "off-1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_since_filters_strictly_and_caps() {
        let conn = setup_db();
        for i in 0..5 {
            CompletionRepository::insert(
                &conn,
                &new_completion(
                    &format!("off-{i}"),
                    &format!("2025-06-01T10:00:0{i}Z"),
                ),
            )
            .unwrap();
        }

        let all =
            CompletionRepository::list_since(&conn, "t1", None, &TaskScope::Tenant, 100).unwrap();
        assert_eq!(all.len(), 5);
        // Newest first.
        assert_eq!(all[0].offline_id, "off-4");

        let after = CompletionRepository::list_since(
            &conn,
            "t1",
            Some("2025-06-01T10:00:02Z"),
            &TaskScope::Tenant,
            100,
        )
        .unwrap();
        assert_eq!(after.len(), 2);

        let capped =
            CompletionRepository::list_since(&conn, "t1", None, &TaskScope::Tenant, 3).unwrap();
        assert_eq!(capped.len(), 3);
    }

    #[test]
    fn list_since_restricted_scope_hides_foreign_entries() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO areas (id, tenant_id, name, created_at, updated_at)
             VALUES ('area-spa', 't1', 'Spa', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let spa = TaskRepository::create_task(
            &conn,
            &TaskCreateParams {
                tenant_id: "t1".into(),
                title: "Spa towels".into(),
                area_id: Some("area-spa".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let office = TaskRepository::create_task(
            &conn,
            &TaskCreateParams {
                tenant_id: "t1".into(),
                title: "Back office".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let mut in_area = new_completion("off-1", "2025-06-01T10:00:00Z");
        in_area.task_id = &spa.id;
        in_area.user_id = "u2";
        CompletionRepository::insert(&conn, &in_area).unwrap();

        let mut foreign = new_completion("off-2", "2025-06-01T10:00:01Z");
        foreign.task_id = &office.id;
        foreign.user_id = "u2";
        CompletionRepository::insert(&conn, &foreign).unwrap();

        // An orphaned entry (its task is gone) written by the caller.
        let mut own = new_completion("off-3", "2025-06-01T10:00:02Z");
        own.user_id = "u1";
        CompletionRepository::insert(&conn, &own).unwrap();

        let scope =
            TaskScope::Restricted { area_ids: vec!["area-spa".into()], user_id: "u1".into() };
        let visible =
            CompletionRepository::list_since(&conn, "t1", None, &scope, 100).unwrap();
        let ids: Vec<&str> = visible.iter().map(|c| c.offline_id.as_str()).collect();
        assert_eq!(ids, vec!["off-3", "off-1"]);

        // Tenant scope still sees everything.
        let all =
            CompletionRepository::list_since(&conn, "t1", None, &TaskScope::Tenant, 100).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn count_for_task() {
        let conn = setup_db();
        CompletionRepository::insert(&conn, &new_completion("off-1", "2025-06-01T10:00:00Z"))
            .unwrap();
        CompletionRepository::insert(&conn, &new_completion("off-2", "2025-06-01T10:01:00Z"))
            .unwrap();
        assert_eq!(CompletionRepository::count_for_task(&conn, "task-1").unwrap(), 2);
        assert_eq!(CompletionRepository::count_for_task(&conn, "task-2").unwrap(), 0);
    }
}
