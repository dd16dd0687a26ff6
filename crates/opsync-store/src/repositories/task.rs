//! Task rows: templates, occurrences, and the mutable status projection.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use opsync_core::ids::{generate_id, now_iso};
use opsync_core::types::{RecurrenceRule, Task, TaskPriority, TaskStatus};

use crate::errors::{Result, StoreError};

/// Parameters for creating a task (or template, when `recurrence_rule` is
/// set).
#[derive(Clone, Debug, Default)]
pub struct TaskCreateParams {
    /// Owning tenant.
    pub tenant_id: String,
    /// Area, if any.
    pub area_id: Option<String>,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Free-form type label.
    pub task_type: Option<String>,
    /// Priority (defaults to medium).
    pub priority: Option<TaskPriority>,
    /// Assignee.
    pub assignee_id: Option<String>,
    /// Due date (`%Y-%m-%d`). Anchors recurrence for templates.
    pub due_date: Option<String>,
    /// Scheduled time-of-day.
    pub scheduled_time: Option<String>,
    /// Whether the task carries a checklist.
    pub has_checklist: bool,
    /// Recurrence rule — makes this row a template.
    pub recurrence_rule: Option<RecurrenceRule>,
}

/// Visibility scope for pull-side task queries.
#[derive(Clone, Debug)]
pub enum TaskScope {
    /// Privileged roles: the whole tenant.
    Tenant,
    /// Non-privileged roles: tasks in the user's areas OR assigned directly.
    Restricted {
        /// Areas the user is a member of.
        area_ids: Vec<String>,
        /// The user themselves, for direct assignment.
        user_id: String,
    },
    /// A single area, for explicitly filtered pulls.
    Area(String),
}

/// Task repository for SQL CRUD operations.
pub struct TaskRepository;

impl TaskRepository {
    /// Create a new task or template.
    pub fn create_task(conn: &Connection, params: &TaskCreateParams) -> Result<Task> {
        let id = generate_id("task");
        let now = now_iso();
        let priority = params.priority.unwrap_or_default();
        let rule_json = params
            .recurrence_rule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Normalize empty strings to None for reference columns.
        let area_id = params.area_id.as_deref().filter(|s| !s.is_empty());
        let assignee_id = params.assignee_id.as_deref().filter(|s| !s.is_empty());

        let _ = conn.execute(
            "INSERT INTO tasks (id, tenant_id, area_id, title, description, task_type,
             priority, status, assignee_id, due_date, scheduled_time, has_checklist,
             recurrence_rule, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                id,
                params.tenant_id,
                area_id,
                params.title,
                params.description,
                params.task_type,
                priority.as_sql(),
                assignee_id,
                params.due_date,
                params.scheduled_time,
                params.has_checklist,
                rule_json,
                now,
            ],
        )?;

        Self::get_task(conn, &params.tenant_id, &id)?
            .ok_or_else(|| StoreError::TaskNotFound(id))
    }

    /// Get a task by ID within a tenant.
    pub fn get_task(conn: &Connection, tenant_id: &str, id: &str) -> Result<Option<Task>> {
        let task = conn
            .query_row(
                "SELECT * FROM tasks WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id],
                |row| Ok(task_from_row(row)),
            )
            .optional()?;
        Ok(task)
    }

    /// Transition a task to completed, stamping the server clock.
    ///
    /// `now` is the server receipt time — client-asserted timestamps are
    /// never used here. Last writer wins on concurrent completions.
    pub fn mark_completed(
        conn: &Connection,
        tenant_id: &str,
        id: &str,
        completed_by: &str,
        now: &str,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE tasks SET status = 'completed', completed_at = ?1, completed_by = ?2,
             updated_at = ?1 WHERE tenant_id = ?3 AND id = ?4",
            params![now, completed_by, tenant_id, id],
        )?;
        Ok(changed > 0)
    }

    /// Reassign a task.
    pub fn set_assignee(
        conn: &Connection,
        tenant_id: &str,
        id: &str,
        assignee_id: Option<&str>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE tasks SET assignee_id = ?1, updated_at = ?2 WHERE tenant_id = ?3 AND id = ?4",
            params![assignee_id, now_iso(), tenant_id, id],
        )?;
        Ok(changed > 0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Recurrence materialization
    // ─────────────────────────────────────────────────────────────────────

    /// List all active recurring templates across tenants.
    pub fn list_templates(conn: &Connection) -> Result<Vec<Task>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE recurrence_rule IS NOT NULL AND source_task_id IS NULL
             ORDER BY created_at",
        )?;
        let tasks = stmt
            .query_map([], |row| Ok(task_from_row(row)))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(tasks)
    }

    /// Count occurrences already materialized for a template.
    pub fn count_occurrences(conn: &Connection, source_task_id: &str) -> Result<u32> {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE source_task_id = ?1",
            params![source_task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Insert one occurrence of a template if `(source_task_id, index)` is
    /// not already present. Returns `true` when a row was created.
    ///
    /// The unique index is the enforcement backstop under concurrent runs;
    /// `ON CONFLICT DO NOTHING` makes the insert-if-absent atomic.
    pub fn insert_occurrence(
        conn: &Connection,
        template: &Task,
        due_date: NaiveDate,
        index: u32,
    ) -> Result<bool> {
        let id = generate_id("task");
        let now = now_iso();
        let changed = conn.execute(
            "INSERT INTO tasks (id, tenant_id, area_id, title, description, task_type,
             priority, status, assignee_id, due_date, scheduled_time, has_checklist,
             source_task_id, recurrence_index, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
             ON CONFLICT(source_task_id, recurrence_index) DO NOTHING",
            params![
                id,
                template.tenant_id,
                template.area_id,
                template.title,
                template.description,
                template.task_type,
                template.priority.as_sql(),
                template.assignee_id,
                due_date.format("%Y-%m-%d").to_string(),
                template.scheduled_time,
                template.has_checklist,
                template.id,
                i64::from(index),
                now,
            ],
        )?;
        Ok(changed > 0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pull queries
    // ─────────────────────────────────────────────────────────────────────

    /// List tasks changed since a cursor, restricted to a visibility scope.
    ///
    /// `since` filters strictly greater, so a row stamped exactly at the
    /// cursor is not repeated.
    pub fn list_updated_since(
        conn: &Connection,
        tenant_id: &str,
        since: Option<&str>,
        scope: &TaskScope,
    ) -> Result<Vec<Task>> {
        let mut conditions = vec!["tenant_id = ?".to_string()];
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(tenant_id.to_string())];

        if let Some(since) = since {
            conditions.push("updated_at > ?".to_string());
            values.push(Box::new(since.to_string()));
        }

        push_scope_conditions(scope, &mut conditions, &mut values);

        let sql = format!(
            "SELECT * FROM tasks WHERE {} ORDER BY updated_at, id",
            conditions.join(" AND ")
        );
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(param_refs.as_slice(), |row| Ok(task_from_row(row)))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(tasks)
    }

    /// Count pending tasks visible to a caller (sync/status probe).
    pub fn count_pending(conn: &Connection, tenant_id: &str, scope: &TaskScope) -> Result<i64> {
        let mut conditions = vec!["tenant_id = ?".to_string(), "status = 'pending'".to_string()];
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(tenant_id.to_string())];

        push_scope_conditions(scope, &mut conditions, &mut values);

        let sql = format!("SELECT COUNT(*) FROM tasks WHERE {}", conditions.join(" AND "));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();
        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Compliance rollup: per area, total vs. completed tasks due in a
    /// date range. Read-only aggregate over the same projection pull serves.
    pub fn compliance_rollup(
        conn: &Connection,
        tenant_id: &str,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<(String, i64, i64)>> {
        let mut stmt = conn.prepare(
            "SELECT COALESCE(area_id, '') AS area, COUNT(*),
                    SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END)
             FROM tasks
             WHERE tenant_id = ?1 AND due_date >= ?2 AND due_date <= ?3
               AND recurrence_rule IS NULL
             GROUP BY area_id ORDER BY area",
        )?;
        let rows = stmt
            .query_map(params![tenant_id, from_date, to_date], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(rows)
    }
}

fn push_scope_conditions(
    scope: &TaskScope,
    conditions: &mut Vec<String>,
    values: &mut Vec<Box<dyn rusqlite::types::ToSql>>,
) {
    match scope {
        TaskScope::Tenant => {}
        TaskScope::Restricted { area_ids, user_id } => {
            if area_ids.is_empty() {
                conditions.push("assignee_id = ?".to_string());
            } else {
                let placeholders = vec!["?"; area_ids.len()].join(", ");
                conditions.push(format!("(area_id IN ({placeholders}) OR assignee_id = ?)"));
                for area in area_ids {
                    values.push(Box::new(area.clone()));
                }
            }
            values.push(Box::new(user_id.clone()));
        }
        TaskScope::Area(area_id) => {
            conditions.push("area_id = ?".to_string());
            values.push(Box::new(area_id.clone()));
        }
    }
}

fn task_from_row(row: &rusqlite::Row<'_>) -> Task {
    let status_str: String = row.get_unwrap("status");
    let priority_str: String = row.get_unwrap("priority");
    let rule_json: Option<String> = row.get_unwrap("recurrence_rule");

    Task {
        id: row.get_unwrap("id"),
        tenant_id: row.get_unwrap("tenant_id"),
        area_id: row.get_unwrap("area_id"),
        title: row.get_unwrap("title"),
        description: row.get_unwrap("description"),
        task_type: row.get_unwrap("task_type"),
        priority: TaskPriority::from_sql(&priority_str).unwrap_or_default(),
        status: TaskStatus::from_sql(&status_str).unwrap_or_default(),
        assignee_id: row.get_unwrap("assignee_id"),
        due_date: row.get_unwrap("due_date"),
        scheduled_time: row.get_unwrap("scheduled_time"),
        has_checklist: row.get_unwrap("has_checklist"),
        recurrence_rule: rule_json.and_then(|j| serde_json::from_str(&j).ok()),
        source_task_id: row.get_unwrap("source_task_id"),
        recurrence_index: row.get_unwrap("recurrence_index"),
        completed_at: row.get_unwrap("completed_at"),
        completed_by: row.get_unwrap("completed_by"),
        created_at: row.get_unwrap("created_at"),
        updated_at: row.get_unwrap("updated_at"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
