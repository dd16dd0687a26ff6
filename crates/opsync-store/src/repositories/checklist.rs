//! Checklist items: mutable projections under a parent task.

use rusqlite::{params, Connection, OptionalExtension};

use opsync_core::ids::{generate_id, now_iso};
use opsync_core::types::{ChecklistItem, ChecklistStatus};

use crate::errors::Result;

/// Checklist item repository.
pub struct ChecklistRepository;

impl ChecklistRepository {
    /// Add an item to a task's checklist.
    pub fn add_item(
        conn: &Connection,
        tenant_id: &str,
        task_id: &str,
        title: &str,
        sort_order: i64,
    ) -> Result<ChecklistItem> {
        let id = generate_id("chk");
        let now = now_iso();
        let _ = conn.execute(
            "INSERT INTO checklist_items (id, task_id, tenant_id, title, sort_order,
             status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
            params![id, task_id, tenant_id, title, sort_order, now],
        )?;
        Ok(ChecklistItem {
            id,
            task_id: task_id.to_string(),
            tenant_id: tenant_id.to_string(),
            title: title.to_string(),
            sort_order,
            status: ChecklistStatus::Pending,
            problem_reason: None,
            completed_at: None,
            completed_by: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get an item by ID within a tenant.
    pub fn get_item(conn: &Connection, tenant_id: &str, id: &str) -> Result<Option<ChecklistItem>> {
        let item = conn
            .query_row(
                "SELECT * FROM checklist_items WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id],
                |row| Ok(item_from_row(row)),
            )
            .optional()?;
        Ok(item)
    }

    /// List a task's checklist in order.
    pub fn list_for_task(conn: &Connection, task_id: &str) -> Result<Vec<ChecklistItem>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM checklist_items WHERE task_id = ?1 ORDER BY sort_order, created_at",
        )?;
        let items = stmt
            .query_map(params![task_id], |row| Ok(item_from_row(row)))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(items)
    }

    /// Apply a status change to an item, stamping the server clock, and bump
    /// the parent task's `updated_at` so the next incremental pull carries
    /// the denormalized checklist. Returns `false` if the item is missing.
    pub fn apply_status(
        conn: &Connection,
        tenant_id: &str,
        id: &str,
        status: ChecklistStatus,
        completed_by: &str,
        problem_reason: Option<&str>,
        now: &str,
    ) -> Result<bool> {
        let completed_at = match status {
            ChecklistStatus::Pending => None,
            _ => Some(now),
        };
        let changed = conn.execute(
            "UPDATE checklist_items SET status = ?1, problem_reason = ?2, completed_at = ?3,
             completed_by = ?4, updated_at = ?5 WHERE tenant_id = ?6 AND id = ?7",
            params![status.as_sql(), problem_reason, completed_at, completed_by, now, tenant_id, id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        let _ = conn.execute(
            "UPDATE tasks SET updated_at = ?1 WHERE id =
             (SELECT task_id FROM checklist_items WHERE id = ?2)",
            params![now, id],
        )?;
        Ok(true)
    }

    /// Whether every item on a task is non-pending. A task with a checklist
    /// counts as complete only when this holds.
    pub fn all_items_done(conn: &Connection, task_id: &str) -> Result<bool> {
        let pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM checklist_items WHERE task_id = ?1 AND status = 'pending'",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(pending == 0)
    }
}

fn item_from_row(row: &rusqlite::Row<'_>) -> ChecklistItem {
    let status_str: String = row.get_unwrap("status");
    ChecklistItem {
        id: row.get_unwrap("id"),
        task_id: row.get_unwrap("task_id"),
        tenant_id: row.get_unwrap("tenant_id"),
        title: row.get_unwrap("title"),
        sort_order: row.get_unwrap("sort_order"),
        status: ChecklistStatus::from_sql(&status_str).unwrap_or_default(),
        problem_reason: row.get_unwrap("problem_reason"),
        completed_at: row.get_unwrap("completed_at"),
        completed_by: row.get_unwrap("completed_by"),
        created_at: row.get_unwrap("created_at"),
        updated_at: row.get_unwrap("updated_at"),
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

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        let task = TaskRepository::create_task(
            &conn,
            &TaskCreateParams {
                tenant_id: "t1".into(),
                title: "Turn-down service".into(),
                has_checklist: true,
                ..Default::default()
            },
        )
        .unwrap();
        (conn, task.id)
    }

    #[test]
    fn add_and_list_items_in_order() {
        let (conn, task_id) = setup();
        ChecklistRepository::add_item(&conn, "t1", &task_id, "Curtains", 2).unwrap();
        ChecklistRepository::add_item(&conn, "t1", &task_id, "Pillows", 1).unwrap();

        let items = ChecklistRepository::list_for_task(&conn, &task_id).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Pillows");
        assert_eq!(items[1].title, "Curtains");
    }

    #[test]
    fn apply_status_updates_item_and_parent() {
        let (conn, task_id) = setup();
        let item = ChecklistRepository::add_item(&conn, "t1", &task_id, "Pillows", 0).unwrap();

        let ok = ChecklistRepository::apply_status(
            &conn, "t1", &item.id, ChecklistStatus::Ok, "u1", None, "2025-06-01T09:00:00Z",
        )
        .unwrap();
        assert!(ok);

        let updated = ChecklistRepository::get_item(&conn, "t1", &item.id).unwrap().unwrap();
        assert_eq!(updated.status, ChecklistStatus::Ok);
        assert_eq!(updated.completed_at.as_deref(), Some("2025-06-01T09:00:00Z"));
        assert_eq!(updated.completed_by.as_deref(), Some("u1"));

        let parent = TaskRepository::get_task(&conn, "t1", &task_id).unwrap().unwrap();
        assert_eq!(parent.updated_at, "2025-06-01T09:00:00Z");
    }

    #[test]
    fn apply_status_missing_item_returns_false() {
        let (conn, _) = setup();
        let ok = ChecklistRepository::apply_status(
            &conn, "t1", "chk-missing", ChecklistStatus::Ok, "u1", None, "2025-06-01T09:00:00Z",
        )
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn apply_status_is_tenant_scoped() {
        let (conn, task_id) = setup();
        let item = ChecklistRepository::add_item(&conn, "t1", &task_id, "Pillows", 0).unwrap();
        let ok = ChecklistRepository::apply_status(
            &conn, "t2", &item.id, ChecklistStatus::Ok, "u1", None, "2025-06-01T09:00:00Z",
        )
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn problem_status_records_reason() {
        let (conn, task_id) = setup();
        let item = ChecklistRepository::add_item(&conn, "t1", &task_id, "Minibar", 0).unwrap();
        ChecklistRepository::apply_status(
            &conn, "t1", &item.id, ChecklistStatus::Problem, "u1", Some("damage"),
            "2025-06-01T09:00:00Z",
        )
        .unwrap();
        let updated = ChecklistRepository::get_item(&conn, "t1", &item.id).unwrap().unwrap();
        assert_eq!(updated.status, ChecklistStatus::Problem);
        assert_eq!(updated.problem_reason.as_deref(), Some("damage"));
    }

    #[test]
    fn all_items_done_tracks_pending() {
        let (conn, task_id) = setup();
        let a = ChecklistRepository::add_item(&conn, "t1", &task_id, "A", 0).unwrap();
        let b = ChecklistRepository::add_item(&conn, "t1", &task_id, "B", 1).unwrap();
        assert!(!ChecklistRepository::all_items_done(&conn, &task_id).unwrap());

        ChecklistRepository::apply_status(
            &conn, "t1", &a.id, ChecklistStatus::Ok, "u1", None, "2025-06-01T09:00:00Z",
        )
        .unwrap();
        assert!(!ChecklistRepository::all_items_done(&conn, &task_id).unwrap());

        ChecklistRepository::apply_status(
            &conn, "t1", &b.id, ChecklistStatus::Problem, "u1", Some("broken"),
            "2025-06-01T09:01:00Z",
        )
        .unwrap();
        // Problem items still count as done — non-pending is the bar.
        assert!(ChecklistRepository::all_items_done(&conn, &task_id).unwrap());
    }
}
