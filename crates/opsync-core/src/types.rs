//! Domain types for tasks, checklists, the completion ledger, and problems.
//!
//! Status enums carry `as_sql`/`from_sql` string mappings; the store never
//! persists enum discriminants, only these strings. Timestamps are ISO 8601
//! TEXT throughout (`%Y-%m-%dT%H:%M:%SZ`), dates are `%Y-%m-%d`.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────
// Status enums
// ─────────────────────────────────────────────────────────────────────

/// Caller role resolved by the surrounding identity layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Tenant administrator.
    Admin,
    /// Department or site manager.
    Manager,
    /// Field staff.
    Staff,
}

impl Role {
    /// Whether this role sees the full tenant on pull (vs. assigned areas).
    #[must_use]
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }

    /// Parse from the SQL/header string form.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

/// Task lifecycle status (the projection, derived from ledger facts plus
/// direct edits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started.
    #[default]
    Pending,
    /// Someone is working on it.
    InProgress,
    /// Done. Terminal for normal flow.
    Completed,
}

impl TaskStatus {
    /// SQL string form.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parse from the SQL string form.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Task priority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// High priority.
    High,
    /// Drop everything.
    Critical,
}

impl TaskPriority {
    /// SQL string form.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse from the SQL string form.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Checklist item status. Items are mutable projections, unlike the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistStatus {
    /// Not yet checked.
    #[default]
    Pending,
    /// Checked off fine.
    Ok,
    /// Checked with a problem flagged.
    Problem,
}

impl ChecklistStatus {
    /// SQL string form.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ok => "ok",
            Self::Problem => "problem",
        }
    }

    /// Parse from the SQL string form.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "ok" => Some(Self::Ok),
            "problem" => Some(Self::Problem),
            _ => None,
        }
    }
}

/// Outcome recorded in a completion ledger entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    /// Completed without issue.
    #[default]
    Ok,
    /// Completed with a problem — spawns a [`Problem`] record.
    Problem,
}

impl CompletionStatus {
    /// SQL string form.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Problem => "problem",
        }
    }

    /// Parse from the SQL string form.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Self::Ok),
            "problem" => Some(Self::Problem),
            _ => None,
        }
    }
}

/// Lifecycle of a reported problem, independent of the ledger entry that
/// spawned it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemStatus {
    /// Reported, nobody assigned.
    #[default]
    Open,
    /// Assigned to someone.
    Assigned,
    /// Fixed.
    Resolved,
}

impl ProblemStatus {
    /// SQL string form.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::Resolved => "resolved",
        }
    }

    /// Parse from the SQL string form.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "assigned" => Some(Self::Assigned),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Recurrence
// ─────────────────────────────────────────────────────────────────────

/// Recurrence frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every `interval` days.
    Daily,
    /// Every `interval` weeks, optionally on specific weekdays.
    Weekly,
    /// Every `interval` months, optionally on a specific day of month.
    Monthly,
}

/// Recurrence rule owned by a task template.
///
/// Only the fields relevant to `frequency` are meaningful; the others are
/// ignored rather than rejected (e.g. `day_of_month` on a weekly rule).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    /// Daily, weekly, or monthly.
    pub frequency: Frequency,
    /// Step between occurrences, at least 1. Values of 0 are treated as 1.
    pub interval: u32,
    /// Weekly only: days of week, 0 = Sunday … 6 = Saturday.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u8>,
    /// Monthly only: target day of month, 1–31 (clamped to month length).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    /// No occurrence is generated after this date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<chrono::NaiveDate>,
    /// Total occurrence cap across all materialization runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_occurrences: Option<u32>,
}

impl RecurrenceRule {
    /// Effective interval — never less than 1.
    #[must_use]
    pub fn step(&self) -> u32 {
        self.interval.max(1)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────

/// An operational area (hotel department, building wing, …). Tasks and
/// user memberships hang off areas; pull scoping for non-privileged roles
/// is driven by membership.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// Server-assigned ID (`area-…`).
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Display name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp (drives incremental pull).
    pub updated_at: String,
}

/// A task row. When `recurrence_rule` is set and `source_task_id` is not,
/// the row doubles as the template for generated occurrences.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-assigned ID (`task-…`).
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Area this task belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    /// Short title.
    pub title: String,
    /// Longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form task type label (e.g. `cleaning`, `maintenance`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    /// Priority.
    pub priority: TaskPriority,
    /// Projection status.
    pub status: TaskStatus,
    /// Assigned user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    /// Due date (`%Y-%m-%d`). Anchors recurrence for templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Scheduled time-of-day (`HH:MM`), display only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
    /// Whether completion requires working through checklist items.
    pub has_checklist: bool,
    /// Recurrence rule — present only on templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<RecurrenceRule>,
    /// Back-reference to the template this occurrence was generated from.
    /// Weak: deleting the template leaves occurrences in place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_task_id: Option<String>,
    /// 0-based ordinal of this occurrence within its template's series.
    /// `(source_task_id, recurrence_index)` is unique.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_index: Option<i64>,
    /// Server-clock completion timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Who completed it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp (drives incremental pull).
    pub updated_at: String,
}

impl Task {
    /// Whether this row is a recurring template (rule set, not itself
    /// a generated occurrence).
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.recurrence_rule.is_some() && self.source_task_id.is_none()
    }
}

/// A checklist item, child of a task, ordered by `sort_order`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    /// Server-assigned ID (`chk-…`).
    pub id: String,
    /// Parent task.
    pub task_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Item label.
    pub title: String,
    /// Position within the checklist.
    pub sort_order: i64,
    /// Item status.
    pub status: ChecklistStatus,
    /// Reason category when flagged as a problem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_reason: Option<String>,
    /// Server-clock completion timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Who checked it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
}

/// An entry in the append-only completion ledger. Immutable once written;
/// `(tenant_id, offline_id)` is unique and is the sole dedupe mechanism
/// against retried submissions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    /// Server-assigned ID (`cmp-…`).
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Client-minted idempotency key.
    pub offline_id: String,
    /// Task this completion applies to.
    pub task_id: String,
    /// Checklist item, or `None` for a whole-task completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist_item_id: Option<String>,
    /// Who did it.
    pub user_id: String,
    /// Outcome.
    pub status: CompletionStatus,
    /// Free-text notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Opaque photo attachment key — never fetched or validated here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Client-asserted timestamp. Audit/ordering only — never trusted for
    /// state transitions.
    pub completed_at: String,
    /// Server receipt timestamp.
    pub synced_at: String,
}

/// A problem spawned from a `status = problem` completion. Owned 1:0..1 by
/// its completion; lifecycle independent of the ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// Server-assigned ID (`prb-…`).
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The ledger entry that reported this problem.
    pub completion_id: String,
    /// Task the problem was reported on.
    pub task_id: String,
    /// Reason category (defaults to `other`).
    pub reason_category: String,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: ProblemStatus,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_sql_roundtrip() {
        for s in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Completed] {
            assert_eq!(TaskStatus::from_sql(s.as_sql()), Some(s));
        }
        assert_eq!(TaskStatus::from_sql("bogus"), None);
    }

    #[test]
    fn checklist_status_sql_roundtrip() {
        for s in [ChecklistStatus::Pending, ChecklistStatus::Ok, ChecklistStatus::Problem] {
            assert_eq!(ChecklistStatus::from_sql(s.as_sql()), Some(s));
        }
    }

    #[test]
    fn completion_status_sql_roundtrip() {
        for s in [CompletionStatus::Ok, CompletionStatus::Problem] {
            assert_eq!(CompletionStatus::from_sql(s.as_sql()), Some(s));
        }
    }

    #[test]
    fn problem_status_sql_roundtrip() {
        for s in [ProblemStatus::Open, ProblemStatus::Assigned, ProblemStatus::Resolved] {
            assert_eq!(ProblemStatus::from_sql(s.as_sql()), Some(s));
        }
    }

    #[test]
    fn role_privilege() {
        assert!(Role::Admin.is_privileged());
        assert!(Role::Manager.is_privileged());
        assert!(!Role::Staff.is_privileged());
        assert_eq!(Role::from_sql("staff"), Some(Role::Staff));
        assert_eq!(Role::from_sql("root"), None);
    }

    #[test]
    fn rule_step_floors_at_one() {
        let rule = RecurrenceRule {
            frequency: Frequency::Daily,
            interval: 0,
            days_of_week: vec![],
            day_of_month: None,
            end_date: None,
            max_occurrences: None,
        };
        assert_eq!(rule.step(), 1);
    }

    #[test]
    fn rule_serde_camel_case() {
        let rule = RecurrenceRule {
            frequency: Frequency::Weekly,
            interval: 2,
            days_of_week: vec![1, 3, 5],
            day_of_month: None,
            end_date: None,
            max_occurrences: Some(10),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["frequency"], "weekly");
        assert_eq!(json["daysOfWeek"], serde_json::json!([1, 3, 5]));
        assert_eq!(json["maxOccurrences"], 10);
        assert!(json.get("dayOfMonth").is_none());
        let back: RecurrenceRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn rule_deserializes_with_missing_optionals() {
        let rule: RecurrenceRule =
            serde_json::from_str(r#"{"frequency":"daily","interval":1}"#).unwrap();
        assert_eq!(rule.frequency, Frequency::Daily);
        assert!(rule.days_of_week.is_empty());
        assert!(rule.end_date.is_none());
    }

    #[test]
    fn template_detection() {
        let mut task = Task {
            id: "task-1".into(),
            tenant_id: "t1".into(),
            area_id: None,
            title: "Check minibar".into(),
            description: None,
            task_type: None,
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            assignee_id: None,
            due_date: Some("2025-01-01".into()),
            scheduled_time: None,
            has_checklist: false,
            recurrence_rule: Some(RecurrenceRule {
                frequency: Frequency::Daily,
                interval: 1,
                days_of_week: vec![],
                day_of_month: None,
                end_date: None,
                max_occurrences: None,
            }),
            source_task_id: None,
            recurrence_index: None,
            completed_at: None,
            completed_by: None,
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        };
        assert!(task.is_template());
        task.source_task_id = Some("task-0".into());
        assert!(!task.is_template());
    }
}
