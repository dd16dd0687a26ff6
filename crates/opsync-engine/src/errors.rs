//! Engine error taxonomy.
//!
//! Two tiers: [`EngineError`] aborts a whole request (scope violations,
//! malformed requests, store failures outside any item), while per-item
//! failures inside a push batch are reported as `PushItemError` entries in
//! the response and never abort the rest of the batch. The string codes in
//! [`codes`] are the machine-readable contract clients branch on.

use opsync_store::StoreError;

/// Machine-readable per-item error codes.
pub mod codes {
    /// Referenced task or checklist item does not exist in this tenant.
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// The item itself is malformed (missing required fields).
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// A storage failure while processing this item. Safe to resubmit.
    pub const STORE_ERROR: &str = "STORE_ERROR";
    /// The caller asked for data outside their visibility scope.
    pub const SCOPE_VIOLATION: &str = "SCOPE_VIOLATION";
}

/// Request-level engine failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Storage failure outside any per-item boundary.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The caller asked for data outside their visibility scope.
    #[error("scope violation: {0}")]
    ScopeViolation(String),

    /// The request as a whole is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl EngineError {
    /// The machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(_) => codes::STORE_ERROR,
            Self::ScopeViolation(_) => codes::SCOPE_VIOLATION,
            Self::InvalidRequest(_) => codes::VALIDATION_ERROR,
        }
    }
}

/// Engine result alias.
pub type Result<T> = std::result::Result<T, EngineError>;
