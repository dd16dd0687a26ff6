//! # opsync-core
//!
//! Shared domain types for the opsync offline-first sync engine.
//!
//! - **IDs**: prefixed UUID v7 generation plus the client-minted offline ID
//! - **Types**: tasks, checklist items, the completion ledger, problems,
//!   areas, recurrence rules, and their SQL string mappings
//! - **Wire**: camelCase request/response DTOs shared by the server and the
//!   client-side offline queue

#![deny(unsafe_code)]

pub mod ids;
pub mod types;
pub mod wire;

pub use types::{
    Area, ChecklistItem, ChecklistStatus, CompletionRecord, CompletionStatus, Frequency, Problem,
    ProblemStatus, RecurrenceRule, Role, Task, TaskPriority, TaskStatus,
};
