//! Areas and user memberships — the input to pull-scope restriction.

use rusqlite::{params, Connection, OptionalExtension};

use opsync_core::ids::{generate_id, now_iso};
use opsync_core::types::Area;

use crate::errors::Result;

/// Area repository.
pub struct AreaRepository;

impl AreaRepository {
    /// Create an area.
    pub fn create_area(conn: &Connection, tenant_id: &str, name: &str) -> Result<Area> {
        let id = generate_id("area");
        let now = now_iso();
        let _ = conn.execute(
            "INSERT INTO areas (id, tenant_id, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, tenant_id, name, now],
        )?;
        Ok(Area {
            id,
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get an area by ID within a tenant.
    pub fn get_area(conn: &Connection, tenant_id: &str, id: &str) -> Result<Option<Area>> {
        let area = conn
            .query_row(
                "SELECT * FROM areas WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id],
                |row| Ok(area_from_row(row)),
            )
            .optional()?;
        Ok(area)
    }

    /// Add a user to an area. Re-adding is a no-op.
    pub fn add_member(conn: &Connection, tenant_id: &str, area_id: &str, user_id: &str) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO area_members (area_id, tenant_id, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(area_id, user_id) DO NOTHING",
            params![area_id, tenant_id, user_id, now_iso()],
        )?;
        Ok(())
    }

    /// IDs of the areas a user belongs to.
    pub fn list_user_area_ids(conn: &Connection, tenant_id: &str, user_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT area_id FROM area_members WHERE tenant_id = ?1 AND user_id = ?2 ORDER BY area_id",
        )?;
        let ids = stmt
            .query_map(params![tenant_id, user_id], |row| row.get(0))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(ids)
    }

    /// Areas changed since a cursor. When `restrict_to` is set, only those
    /// IDs are eligible (membership restriction for non-privileged roles).
    pub fn list_updated_since(
        conn: &Connection,
        tenant_id: &str,
        since: Option<&str>,
        restrict_to: Option<&[String]>,
    ) -> Result<Vec<Area>> {
        let mut conditions = vec!["tenant_id = ?".to_string()];
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(tenant_id.to_string())];

        if let Some(since) = since {
            conditions.push("updated_at > ?".to_string());
            values.push(Box::new(since.to_string()));
        }
        if let Some(ids) = restrict_to {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            conditions.push(format!("id IN ({placeholders})"));
            for id in ids {
                values.push(Box::new(id.clone()));
            }
        }

        let sql = format!(
            "SELECT * FROM areas WHERE {} ORDER BY updated_at, id",
            conditions.join(" AND ")
        );
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let areas = stmt
            .query_map(param_refs.as_slice(), |row| Ok(area_from_row(row)))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(areas)
    }
}

fn area_from_row(row: &rusqlite::Row<'_>) -> Area {
    Area {
        id: row.get_unwrap("id"),
        tenant_id: row.get_unwrap("tenant_id"),
        name: row.get_unwrap("name"),
        created_at: row.get_unwrap("created_at"),
        updated_at: row.get_unwrap("updated_at"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
