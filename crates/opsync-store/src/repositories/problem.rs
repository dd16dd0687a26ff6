//! Problem records spawned from `status = problem` completions.

use rusqlite::{params, Connection, OptionalExtension};

use opsync_core::ids::{generate_id, now_iso};
use opsync_core::types::{Problem, ProblemStatus};

use crate::errors::Result;

/// Problem repository.
pub struct ProblemRepository;

impl ProblemRepository {
    /// Create a problem referencing a ledger entry. The completion owns its
    /// problem 1:0..1; a second create for the same completion violates the
    /// unique constraint.
    pub fn create(
        conn: &Connection,
        tenant_id: &str,
        completion_id: &str,
        task_id: &str,
        reason_category: &str,
        description: Option<&str>,
    ) -> Result<Problem> {
        let id = generate_id("prb");
        let now = now_iso();
        let _ = conn.execute(
            "INSERT INTO problems (id, tenant_id, completion_id, task_id, reason_category,
             description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?7)",
            params![id, tenant_id, completion_id, task_id, reason_category, description, now],
        )?;
        Ok(Problem {
            id,
            tenant_id: tenant_id.to_string(),
            completion_id: completion_id.to_string(),
            task_id: task_id.to_string(),
            reason_category: reason_category.to_string(),
            description: description.map(String::from),
            status: ProblemStatus::Open,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get the problem spawned by a completion, if any.
    pub fn get_for_completion(
        conn: &Connection,
        tenant_id: &str,
        completion_id: &str,
    ) -> Result<Option<Problem>> {
        let problem = conn
            .query_row(
                "SELECT * FROM problems WHERE tenant_id = ?1 AND completion_id = ?2",
                params![tenant_id, completion_id],
                |row| Ok(problem_from_row(row)),
            )
            .optional()?;
        Ok(problem)
    }

    /// Advance a problem's lifecycle. Returns `false` if not found.
    pub fn set_status(
        conn: &Connection,
        tenant_id: &str,
        id: &str,
        status: ProblemStatus,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE problems SET status = ?1, updated_at = ?2 WHERE tenant_id = ?3 AND id = ?4",
            params![status.as_sql(), now_iso(), tenant_id, id],
        )?;
        Ok(changed > 0)
    }

    /// Open problems for a tenant, oldest first.
    pub fn list_open(conn: &Connection, tenant_id: &str) -> Result<Vec<Problem>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM problems WHERE tenant_id = ?1 AND status = 'open' ORDER BY created_at",
        )?;
        let problems = stmt
            .query_map(params![tenant_id], |row| Ok(problem_from_row(row)))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(problems)
    }
}

fn problem_from_row(row: &rusqlite::Row<'_>) -> Problem {
    let status_str: String = row.get_unwrap("status");
    Problem {
        id: row.get_unwrap("id"),
        tenant_id: row.get_unwrap("tenant_id"),
        completion_id: row.get_unwrap("completion_id"),
        task_id: row.get_unwrap("task_id"),
        reason_category: row.get_unwrap("reason_category"),
        description: row.get_unwrap("description"),
        status: ProblemStatus::from_sql(&status_str).unwrap_or_default(),
        created_at: row.get_unwrap("created_at"),
        updated_at: row.get_unwrap("updated_at"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
