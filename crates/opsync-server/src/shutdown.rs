//! Shutdown signaling shared by the serve task and the materializer loop.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fans a single shutdown signal out to every long-lived task. The HTTP
/// serve loop and the materializer each watch a clone of the token;
/// cancelling it is idempotent.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// New coordinator with an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    /// A token clone for a task to watch.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown. Safe to call more than once.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown and wait up to `grace` for the given tasks to
    /// finish. Tasks still running after the grace period are left to
    /// die with the process.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, grace: Duration) {
        self.shutdown();
        info!(tasks = handles.len(), grace_secs = grace.as_secs(), "draining tasks");
        if tokio::time::timeout(grace, futures::future::join_all(handles)).await.is_err() {
            warn!("tasks still running after {grace:?} grace period");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_untriggered() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[test]
    fn shutdown_is_idempotent_and_reaches_every_token() {
        let coord = ShutdownCoordinator::new();
        let a = coord.token();
        let b = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_cooperative_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        coord.drain(vec![handle], Duration::from_secs(1)).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_gives_up_on_stuck_tasks() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        coord.drain(vec![handle], Duration::from_millis(50)).await;
        assert!(coord.is_shutting_down());
    }
}
