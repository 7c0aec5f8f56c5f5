//! Status-change hook for an external notification subsystem. Delivery
//! guarantees beyond the in-process channel are not this crate's concern.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    JobFunded {
        job_id: Uuid,
    },
    JobResolved {
        job_id: Uuid,
        winner_id: Uuid,
    },
    JobExpired {
        job_id: Uuid,
    },
    JobCancelled {
        job_id: Uuid,
    },
    JobRefunded {
        job_id: Uuid,
    },
    SubmissionCompleted {
        submission_id: Uuid,
        job_id: Uuid,
        worker_id: Uuid,
        passed: bool,
    },
}

/// Fan-out channel for lifecycle events. Publishing never fails; events are
/// dropped when no subscriber is listening.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
