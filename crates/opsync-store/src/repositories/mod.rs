//! SQL data access layer.
//!
//! All repository methods take a `&Connection` parameter and are stateless —
//! pure functions that translate between Rust types and SQL. IDs are
//! prefixed UUID v7 strings generated via `opsync_core::ids::generate_id`.

pub mod area;
pub mod checklist;
pub mod completion;
pub mod problem;
pub mod task;

pub use area::AreaRepository;
pub use checklist::ChecklistRepository;
pub use completion::{CompletionRepository, NewCompletion};
pub use problem::ProblemRepository;
pub use task::{TaskCreateParams, TaskRepository, TaskScope};
