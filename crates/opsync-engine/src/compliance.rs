//! Compliance rollup: per-area completion rates over a due-date range.

use rusqlite::Connection;
use serde::Serialize;

use opsync_store::repositories::task::TaskRepository;

use crate::errors::Result;
use crate::SyncContext;

/// Completion stats for one area. `area_id` is `None` for tasks that
/// belong to no area.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaCompliance {
    /// Area, or `None` for unassigned tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    /// Tasks due in the range.
    pub total: i64,
    /// Of those, completed.
    pub completed: i64,
    /// `completed / total`, zero when nothing was due.
    pub rate: f64,
}

/// Per-area completion rates for tasks due in `[from_date, to_date]`.
/// Templates are excluded; only concrete tasks count.
pub fn compliance_by_area(
    conn: &Connection,
    ctx: &SyncContext,
    from_date: &str,
    to_date: &str,
) -> Result<Vec<AreaCompliance>> {
    let rows = TaskRepository::compliance_rollup(conn, &ctx.tenant_id, from_date, to_date)?;
    let report = rows
        .into_iter()
        .map(|(area, total, completed)| {
            let rate = if total > 0 { completed as f64 / total as f64 } else { 0.0 };
            AreaCompliance { area_id: (!area.is_empty()).then_some(area), total, completed, rate }
        })
        .collect();
    Ok(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use opsync_core::types::Role;
    use opsync_store::migrations::run_migrations;
    use opsync_store::repositories::task::{TaskCreateParams, TaskRepository};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn ctx() -> SyncContext {
        SyncContext { tenant_id: "t1".into(), user_id: "mgr".into(), role: Role::Manager }
    }

    #[test]
    fn rates_roll_up_per_area() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO areas (id, tenant_id, name, created_at, updated_at)
             VALUES ('area-1', 't1', 'Spa', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let mut ids = Vec::new();
        for i in 0..4 {
            let task = TaskRepository::create_task(
                &conn,
                &TaskCreateParams {
                    tenant_id: "t1".into(),
                    title: format!("Task {i}"),
                    area_id: Some("area-1".into()),
                    due_date: Some("2025-06-01".into()),
                    ..Default::default()
                },
            )
            .unwrap();
            ids.push(task.id);
        }
        TaskRepository::mark_completed(&conn, "t1", &ids[0], "u1", "2025-06-01T10:00:00Z")
            .unwrap();

        let report = compliance_by_area(&conn, &ctx(), "2025-06-01", "2025-06-30").unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].area_id.as_deref(), Some("area-1"));
        assert_eq!(report[0].total, 4);
        assert_eq!(report[0].completed, 1);
        assert!((report[0].rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn unassigned_tasks_group_under_none() {
        let conn = setup_db();
        TaskRepository::create_task(
            &conn,
            &TaskCreateParams {
                tenant_id: "t1".into(),
                title: "Loose end".into(),
                due_date: Some("2025-06-01".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let report = compliance_by_area(&conn, &ctx(), "2025-06-01", "2025-06-30").unwrap();
        assert_eq!(report.len(), 1);
        assert!(report[0].area_id.is_none());
        assert!((report[0].rate - 0.0).abs() < f64::EPSILON);
    }
}
