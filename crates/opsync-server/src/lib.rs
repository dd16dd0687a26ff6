//! # opsync-server
//!
//! HTTP sync gateway for the offline-first task engine:
//!
//! - **Routes**: `/sync/pull`, `/sync/push`, `/sync/completions`,
//!   `/sync/status`, `/reports/compliance`, plus `/health` and `/metrics`
//! - **Identity**: trusted proxy headers resolved into a per-request
//!   [`opsync_engine::SyncContext`]
//! - **Materializer loop**: a background task that rolls the occurrence
//!   window forward on an interval
//!
//! All sync semantics live in `opsync-engine`; this crate is transport,
//! wiring, and observability.

#![deny(unsafe_code)]

pub mod config;
pub mod identity;
pub mod materialize_loop;
pub mod metrics;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use server::OpsyncServer;
pub use shutdown::ShutdownCoordinator;
