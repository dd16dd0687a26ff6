//! ID generation helpers.
//!
//! Server-side entity IDs are prefixed UUID v7 strings (time-ordered), e.g.
//! `task-0195b7a2-…`. Offline IDs are minted by clients at capture time and
//! act as the idempotency key for the completion ledger; they only need to be
//! unique within a tenant, so `device-timestamp-random` is sufficient.

use rand::Rng;
use uuid::Uuid;

/// Generate a prefixed UUID v7 ID.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::now_v7())
}

/// Mint a client-side offline ID: `<device>-<unix seconds>-<random suffix>`.
///
/// The random suffix guards against two captures in the same second on the
/// same device.
#[must_use]
pub fn new_offline_id(device_id: &str, now_unix: i64) -> String {
    let suffix: u32 = rand::rng().random_range(0..0xFFFF);
    format!("{device_id}-{now_unix}-{suffix:04x}")
}

/// Current UTC timestamp as an ISO 8601 string (`%Y-%m-%dT%H:%M:%SZ`).
///
/// All timestamps are stored as TEXT in this format; lexicographic order
/// matches chronological order, which the incremental pull relies on.
#[must_use]
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
