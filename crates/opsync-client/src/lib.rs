//! # opsync-client
//!
//! Device-side offline support for the sync gateway:
//!
//! - **Outbox**: a durable local `SQLite` queue — completions are
//!   persisted with a freshly minted `offline_id` before any network
//!   attempt
//! - **Flusher**: batch push with partial-success bookkeeping, and a
//!   single-item fallback when the batch endpoint is unreachable
//!
//! The server dedupes on `(tenant_id, offline_id)`, so every operation
//! here is safe to repeat after a crash, timeout, or double flush.

#![deny(unsafe_code)]

pub mod errors;
pub mod flush;
pub mod queue;

pub use errors::{ClientError, Result};
pub use flush::{Flusher, FlushReport, GatewayClient, GatewayIdentity};
pub use queue::{CompletionDraft, OfflineQueue, QueuedCompletion, SYNCED_RETENTION_DAYS};
