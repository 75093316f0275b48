//! Event types and broadcast bus for the qproof event system

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// qproof event types
///
/// Broadcast by the extraction-quality service for SSE consumers and
/// operational tooling. Events carry enough context to be rendered without
/// a follow-up query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QproofEvent {
    /// An extraction record was routed and processed
    RecordProcessed {
        record_id: Uuid,
        tier: String,
        score: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A failure pattern crossed the minimum-occurrence bound
    PatternDetected {
        signature: String,
        field_name: String,
        frequency: i64,
        severity: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A fix proposal was applied to staging
    FixStaged {
        fix_id: Uuid,
        pattern_signature: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A fix proposal was promoted to production
    FixPromoted {
        fix_id: Uuid,
        pattern_signature: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A fix proposal was rolled back (operator or system)
    FixRolledBack {
        fix_id: Uuid,
        pattern_signature: String,
        actor: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl QproofEvent {
    /// Event type name for SSE event framing
    pub fn event_type(&self) -> &'static str {
        match self {
            QproofEvent::RecordProcessed { .. } => "RecordProcessed",
            QproofEvent::PatternDetected { .. } => "PatternDetected",
            QproofEvent::FixStaged { .. } => "FixStaged",
            QproofEvent::FixPromoted { .. } => "FixPromoted",
            QproofEvent::FixRolledBack { .. } => "FixRolledBack",
        }
    }
}

/// Broadcast event bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Cloning shares the same
/// channel. Slow subscribers drop the oldest events rather than blocking
/// emitters.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QproofEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<QproofEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count, or an error when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: QproofEvent,
    ) -> Result<usize, broadcast::error::SendError<QproofEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    ///
    /// Used for informational events where a missing listener is fine.
    pub fn emit_lossy(&self, event: QproofEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for event");
        }
    }

    /// Channel capacity this bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
