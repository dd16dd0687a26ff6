//! # opsync-engine
//!
//! The sync semantics layer, sitting between the HTTP surface and the
//! store:
//!
//! - **Push**: ingest offline-captured completions and checklist updates,
//!   one transaction per item, duplicates as successful no-ops
//! - **Pull**: incremental, scope-restricted snapshots of tasks, areas,
//!   and recent ledger entries
//! - **Materializer**: expand recurring templates into concrete task rows
//!   over a rolling window, idempotently
//! - **Notify**: post-commit fan-out of completion and problem facts
//! - **Compliance**: per-area completion-rate rollups
//!
//! Everything here operates on a borrowed `rusqlite::Connection`; pooling,
//! threading, and clocks for the materializer belong to the caller.

#![deny(unsafe_code)]

pub mod compliance;
pub mod errors;
pub mod materializer;
pub mod notify;
pub mod pull;
pub mod push;

pub use errors::{EngineError, Result};
pub use notify::{LogDispatcher, NotificationDispatcher, SyncFact};

use opsync_core::types::Role;

/// The authenticated caller, resolved by the surrounding identity layer.
/// Everything the engine does is scoped to this triple.
#[derive(Clone, Debug)]
pub struct SyncContext {
    /// Tenant every query and write is scoped to.
    pub tenant_id: String,
    /// Acting user; stamped as `completed_by` / ledger `user_id`.
    pub user_id: String,
    /// Role, which decides pull visibility.
    pub role: Role,
}
