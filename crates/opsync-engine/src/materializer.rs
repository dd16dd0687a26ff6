//! Occurrence materialization: expand recurring templates into concrete
//! task rows over a rolling window.
//!
//! Runs are idempotent. Every slot insert goes through the unique
//! `(source_task_id, recurrence_index)` guard, so overlapping runs and
//! re-runs with a wider window create nothing twice. Callers supply
//! `today` so the engine stays clock-free like the recurrence math.

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, warn};

use opsync_core::types::Task;
use opsync_recurrence::generate_occurrences;
use opsync_store::repositories::task::TaskRepository;

use crate::errors::Result;

/// Default rolling window, in days ahead of `today`.
pub const DEFAULT_WINDOW_DAYS: u32 = 14;

/// Outcome of one [`materialize_all`] sweep.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    /// Templates examined.
    pub templates: u32,
    /// Occurrence rows created across all templates.
    pub created: u32,
    /// Templates whose expansion failed. Failures are isolated per
    /// template; the sweep always visits every template.
    pub failures: Vec<TemplateFailure>,
}

/// One failed template in a sweep.
#[derive(Debug)]
pub struct TemplateFailure {
    /// The template that failed.
    pub template_id: String,
    /// What went wrong.
    pub error: String,
}

/// Expand every recurring template in the store. Per-template failures are
/// logged and reported, never propagated.
pub fn materialize_all(
    conn: &Connection,
    today: NaiveDate,
    window_days: u32,
) -> Result<MaterializeReport> {
    let templates = TaskRepository::list_templates(conn)?;
    let mut report = MaterializeReport {
        templates: u32::try_from(templates.len()).unwrap_or(u32::MAX),
        ..Default::default()
    };

    for template in &templates {
        match materialize_template(conn, template, today, window_days) {
            Ok(created) => report.created += created,
            Err(err) => {
                warn!(template_id = %template.id, error = %err, "template materialization failed");
                report.failures.push(TemplateFailure {
                    template_id: template.id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    debug!(
        templates = report.templates,
        created = report.created,
        failed = report.failures.len(),
        "materialization sweep done"
    );
    Ok(report)
}

/// Expand one template into the `[today, today + window_days]` window.
/// Returns the number of rows created; zero when everything in the window
/// already exists.
pub fn materialize_template(
    conn: &Connection,
    template: &Task,
    today: NaiveDate,
    window_days: u32,
) -> Result<u32> {
    let Some(rule) = template.recurrence_rule.as_ref() else {
        return Ok(0);
    };

    let seed = match template.due_date.as_deref() {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => {
                warn!(template_id = %template.id, due_date = raw, "unparseable template due date, anchoring at today");
                today
            }
        },
        None => today,
    };

    let existing = TaskRepository::count_occurrences(conn, &template.id)?;
    let slots = generate_occurrences(seed, rule, today, window_days, existing);

    let mut created = 0u32;
    for slot in slots {
        match TaskRepository::insert_occurrence(conn, template, slot.date, slot.index) {
            Ok(true) => created += 1,
            // Index already present: an earlier or concurrent run won.
            Ok(false) => {}
            Err(err) if err.is_unique_violation() => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(created)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
