//! Notification fan-out for facts established during a push.
//!
//! Dispatch happens strictly after the owning transaction commits, so a
//! dispatcher never observes state that later rolled back. Delivery is
//! fire-and-forget; sync correctness never depends on it.

use std::sync::Mutex;

use tracing::info;

/// A domain fact worth telling someone about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncFact {
    /// A task's projection transitioned to completed.
    TaskCompleted {
        /// Owning tenant.
        tenant_id: String,
        /// The completed task.
        task_id: String,
        /// Who completed it.
        completed_by: String,
    },
    /// A `status = problem` completion spawned a problem record.
    ProblemReported {
        /// Owning tenant.
        tenant_id: String,
        /// Task the problem was reported on.
        task_id: String,
        /// The new problem record.
        problem_id: String,
        /// Reason category.
        reason_category: String,
    },
}

/// Sink for [`SyncFact`]s. Implementations must tolerate being called from
/// blocking database worker threads.
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one fact. Must not block for long and must not fail loudly.
    fn dispatch(&self, fact: &SyncFact);
}

/// Dispatcher that records facts to the structured log. The default sink
/// when no external channel is wired up.
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, fact: &SyncFact) {
        match fact {
            SyncFact::TaskCompleted { tenant_id, task_id, completed_by } => {
                info!(tenant_id, task_id, completed_by, "task completed");
            }
            SyncFact::ProblemReported { tenant_id, task_id, problem_id, reason_category } => {
                info!(tenant_id, task_id, problem_id, reason_category, "problem reported");
            }
        }
    }
}

/// Dispatcher that keeps every fact in memory, for assertions in tests.
#[derive(Default)]
pub struct RecordingDispatcher {
    facts: Mutex<Vec<SyncFact>>,
}

impl RecordingDispatcher {
    /// Snapshot of everything dispatched so far.
    #[must_use]
    pub fn facts(&self) -> Vec<SyncFact> {
        self.facts.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, fact: &SyncFact) {
        if let Ok(mut facts) = self.facts.lock() {
            facts.push(fact.clone());
        }
    }
}
