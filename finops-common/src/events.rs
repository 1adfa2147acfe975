//! Event types for the FinOps event system

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// FinOps event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FinopsEvent {
    /// A validation pass started for a tenant
    ValidationPassStarted {
        tenant_id: String,
        pending_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A pattern was validated and promoted to an active rule
    PatternValidated {
        tenant_id: String,
        pattern_id: Uuid,
        rule_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A pattern was rejected by the validator
    PatternRejected {
        tenant_id: String,
        pattern_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A pattern was skipped (model call failed, left pending)
    PatternSkipped {
        tenant_id: String,
        pattern_id: Uuid,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A validation pass completed
    ValidationPassCompleted {
        tenant_id: String,
        processed_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for FinOps events
///
/// Subscribers receive all events emitted after subscription; events emitted
/// with no subscribers are dropped (emission is best-effort).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FinopsEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<FinopsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count, or 0 when nobody is listening.
    pub fn emit(&self, event: FinopsEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}
