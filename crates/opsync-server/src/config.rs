//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the sync gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max request body size in bytes. Push batches from a device that was
    /// offline for days can be large, but not unbounded.
    pub max_body_bytes: usize,
    /// Seconds between materializer sweeps.
    pub materialize_interval_secs: u64,
    /// Days ahead of today the materializer fills.
    pub materialize_window_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_body_bytes: 4 * 1024 * 1024, // 4 MB
            materialize_interval_secs: 300,
            materialize_window_days: 14,
        }
    }
}
