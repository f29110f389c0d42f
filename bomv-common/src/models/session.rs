//! Session lifecycle state machine
//!
//! A session progresses through 8 defined states:
//! CREATED → UPLOADED → DETECTING → DETECTED → VERIFYING → VERIFIED → GENERATING_BOM → COMPLETED
//!
//! ERROR is reachable from every non-terminal state and is left only by an
//! operator retry of the action that failed.

use super::{BomData, Detection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session record exists, no drawing stored yet
    Created,
    /// Drawing stored
    Uploaded,
    /// Detection pass running
    Detecting,
    /// Detection results available
    Detected,
    /// Operator is reviewing detections
    Verifying,
    /// No pending detections remain
    Verified,
    /// BOM aggregation running
    GeneratingBom,
    /// BOM generated
    Completed,
    /// Last action failed; retry the action to resume
    Error,
}

impl SessionStatus {
    /// Position in the forward lifecycle. `Error` sits outside the order.
    fn rank(self) -> Option<u8> {
        match self {
            SessionStatus::Created => Some(0),
            SessionStatus::Uploaded => Some(1),
            SessionStatus::Detecting => Some(2),
            SessionStatus::Detected => Some(3),
            SessionStatus::Verifying => Some(4),
            SessionStatus::Verified => Some(5),
            SessionStatus::GeneratingBom => Some(6),
            SessionStatus::Completed => Some(7),
            SessionStatus::Error => None,
        }
    }

    /// Check whether moving from `self` to `next` keeps the lifecycle monotonic
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        if self == next {
            return true;
        }
        match (self.rank(), next.rank()) {
            // Error is reachable from anything but the terminal state
            (Some(_), None) => !self.is_terminal(),
            // Retry out of error
            (None, Some(_)) => true,
            (Some(current), Some(target)) => target > current,
            (None, None) => true,
        }
    }

    /// Check if status is terminal (finished)
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Uploaded => "uploaded",
            SessionStatus::Detecting => "detecting",
            SessionStatus::Detected => "detected",
            SessionStatus::Verifying => "verifying",
            SessionStatus::Verified => "verified",
            SessionStatus::GeneratingBom => "generating_bom",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub session_id: String,
    pub old_status: SessionStatus,
    pub new_status: SessionStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// Rejected status transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Server-tracked drawing-analysis session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Server-assigned session identifier
    pub session_id: String,

    /// Original drawing filename
    pub filename: String,

    /// Current workflow status
    pub status: SessionStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub detection_count: usize,

    #[serde(default)]
    pub verified_count: usize,

    #[serde(default)]
    pub bom_generated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Status held when the session entered `Error` locally
    #[serde(skip)]
    pub failed_from: Option<SessionStatus>,
}

impl Session {
    /// Create new session record in `Created` status
    pub fn new(session_id: impl Into<String>, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            filename: filename.into(),
            status: SessionStatus::Created,
            created_at: now,
            updated_at: now,
            detection_count: 0,
            verified_count: 0,
            bom_generated: false,
            error_message: None,
            failed_from: None,
        }
    }

    /// Transition to new status
    ///
    /// Leaving `Error` must be a move the status before the failure allowed,
    /// so only a retry of the failed action resumes. An error reported by the
    /// server has no recorded origin and accepts any forward status.
    /// Rejected transitions leave the session untouched.
    pub fn transition_to(
        &mut self,
        new_status: SessionStatus,
    ) -> Result<StatusTransition, InvalidTransition> {
        let allowed = match (self.status, self.failed_from) {
            (SessionStatus::Error, Some(prior)) if new_status != SessionStatus::Error => {
                prior.can_transition_to(new_status)
            }
            _ => self.status.can_transition_to(new_status),
        };
        if !allowed {
            return Err(InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        let now = Utc::now();
        let transition = StatusTransition {
            session_id: self.session_id.clone(),
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        if new_status == SessionStatus::Error {
            if self.status != SessionStatus::Error {
                self.failed_from = Some(self.status);
            }
        } else {
            self.error_message = None;
            self.failed_from = None;
        }
        self.status = new_status;
        self.updated_at = now;

        Ok(transition)
    }
}

/// Session with its detections and derived counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,

    #[serde(default)]
    pub detections: Vec<Detection>,

    #[serde(default)]
    pub approved_count: usize,

    #[serde(default)]
    pub rejected_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bom_data: Option<BomData>,

    #[serde(default)]
    pub image_width: u32,

    #[serde(default)]
    pub image_height: u32,
}

impl SessionDetail {
    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }
}
