//! # opsync-store
//!
//! `SQLite` persistence for the sync engine:
//!
//! - **Connection pool**: `r2d2` + `r2d2_sqlite` with WAL mode, foreign keys,
//!   and busy-timeout pragmas applied per connection
//! - **Migrations**: version-tracked SQL embedded at compile time
//! - **Repositories**: stateless functions over `&Connection` for areas,
//!   tasks, checklist items, the completion ledger, and problems
//!
//! The pool handle is constructed by the process's top-level wiring and
//! injected into every component — there is no global database state.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use errors::{Result, StoreError};
