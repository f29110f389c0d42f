//! Session event types and EventBus
//!
//! The orchestrator emits a `SessionEvent` after every state change so that a
//! driving UI can re-render without polling.

use crate::models::{SessionStatus, VerificationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Session event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to a UI process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Session state replaced by a server load
    SessionLoaded {
        session_id: String,
        status: SessionStatus,
        detection_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Detection request issued
    DetectionStarted {
        session_id: String,
        request_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Detection result installed
    DetectionCommitted {
        session_id: String,
        request_id: Uuid,
        detection_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Response of a superseded or cancelled request dropped
    DetectionDiscarded {
        session_id: String,
        request_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// In-flight detection cancelled by the operator or a timeout
    DetectionCancelled {
        session_id: String,
        request_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Single detection verified
    DetectionUpdated {
        session_id: String,
        detection_id: String,
        status: VerificationStatus,
        timestamp: DateTime<Utc>,
    },

    /// Bulk verification applied
    BulkVerified {
        session_id: String,
        status: VerificationStatus,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Manual detection added
    DetectionAdded {
        session_id: String,
        detection_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Detection removed
    DetectionDeleted {
        session_id: String,
        detection_id: String,
        timestamp: DateTime<Utc>,
    },

    /// New BOM snapshot installed
    BomGenerated {
        session_id: String,
        total_items: usize,
        total: f64,
        timestamp: DateTime<Utc>,
    },

    /// Local status projection changed
    StatusChanged {
        session_id: String,
        old_status: SessionStatus,
        new_status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// Action failed; message is shown in the error banner
    ErrorRaised {
        session_id: Option<String>,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Session-scoped state cleared
    Reset { timestamp: DateTime<Utc> },
}

/// Broadcast bus for session events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}
