//! Import events, progress reporting and cooperative stop checks
//!
//! The orchestrator reports a phase description whenever a stage starts and
//! current/total counters as partitions finish. Reporters are called from
//! worker threads and must not block.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Events emitted during an import session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportEvent {
    /// Human-readable phase description
    Phase {
        session_id: Uuid,
        description: String,
    },

    /// Current/total progress counters
    Progress {
        session_id: Uuid,
        current: usize,
        total: usize,
    },

    /// One partition finished (successfully or not)
    PartitionFinished {
        session_id: Uuid,
        speaker: String,
        discourse: String,
        status: String,
        failures: usize,
    },
}

/// Callback surface for progress reporting
pub trait ProgressReporter: Send + Sync {
    /// A new phase started
    fn phase(&self, description: &str);

    /// Progress counters changed
    fn progress(&self, current: usize, total: usize);

    /// Partition-level summary; optional for reporters that only track counters
    fn partition_finished(&self, _speaker: &str, _discourse: &str, _status: &str, _failures: usize) {}
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn phase(&self, _description: &str) {}

    fn progress(&self, _current: usize, _total: usize) {}
}

/// Reporter forwarding to a pair of closures
pub struct CallbackReporter<P, C>
where
    P: Fn(&str) + Send + Sync,
    C: Fn(usize, usize) + Send + Sync,
{
    on_phase: P,
    on_progress: C,
}

impl<P, C> CallbackReporter<P, C>
where
    P: Fn(&str) + Send + Sync,
    C: Fn(usize, usize) + Send + Sync,
{
    pub fn new(on_phase: P, on_progress: C) -> Self {
        Self {
            on_phase,
            on_progress,
        }
    }
}

impl<P, C> ProgressReporter for CallbackReporter<P, C>
where
    P: Fn(&str) + Send + Sync,
    C: Fn(usize, usize) + Send + Sync,
{
    fn phase(&self, description: &str) {
        (self.on_phase)(description)
    }

    fn progress(&self, current: usize, total: usize) {
        (self.on_progress)(current, total)
    }
}

/// Reporter broadcasting [`ImportEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastReporter {
    session_id: Uuid,
    tx: broadcast::Sender<ImportEvent>,
}

impl BroadcastReporter {
    /// Create a reporter with its own channel of the given capacity
    pub fn new(session_id: Uuid, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { session_id, tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: ImportEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for BroadcastReporter {
    fn phase(&self, description: &str) {
        self.emit(ImportEvent::Phase {
            session_id: self.session_id,
            description: description.to_string(),
        });
    }

    fn progress(&self, current: usize, total: usize) {
        self.emit(ImportEvent::Progress {
            session_id: self.session_id,
            current,
            total,
        });
    }

    fn partition_finished(&self, speaker: &str, discourse: &str, status: &str, failures: usize) {
        self.emit(ImportEvent::PartitionFinished {
            session_id: self.session_id,
            speaker: speaker.to_string(),
            discourse: discourse.to_string(),
            status: status.to_string(),
            failures,
        });
    }
}

/// Cooperative stop predicate, polled between partitions and stages
pub trait StopCheck: Send + Sync {
    fn should_stop(&self) -> bool;
}

impl StopCheck for CancellationToken {
    fn should_stop(&self) -> bool {
        self.is_cancelled()
    }
}

/// Adapts a plain predicate into a [`StopCheck`]
pub struct StopFn<F>(pub F);

impl<F> StopCheck for StopFn<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_stop(&self) -> bool {
        (self.0)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_callback_reporter_forwards_counters() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let reporter = CallbackReporter::new(|_| {}, move |current, _| {
            seen_clone.store(current, Ordering::SeqCst);
        });

        reporter.progress(3, 7);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_broadcast_reporter_emits_tagged_events() {
        let session_id = Uuid::new_v4();
        let reporter = BroadcastReporter::new(session_id, 8);
        let mut rx = reporter.subscribe();

        reporter.phase("Importing syllables...");
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ImportEvent::Phase {
                session_id,
                description: "Importing syllables...".to_string()
            }
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase");
    }

    #[test]
    fn test_cancellation_token_is_a_stop_check() {
        let token = CancellationToken::new();
        assert!(!token.should_stop());
        token.cancel();
        assert!(token.should_stop());
    }

    #[test]
    fn test_closure_is_a_stop_check() {
        let check = StopFn(|| true);
        assert!(check.should_stop());
    }
}
