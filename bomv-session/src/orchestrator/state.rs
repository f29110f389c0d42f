//! Session state snapshot

use crate::gateway::SessionImage;
use bomv_common::models::{BomData, Detection, SessionDetail, VerificationStatus};
use serde::Serialize;

/// Everything the UI renders for the current session
///
/// `session.detections` and `session.bom_data` are always empty; the live
/// values are the top-level `detections` and `bom_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub session: Option<SessionDetail>,
    pub detections: Vec<Detection>,
    pub bom_data: Option<BomData>,
    pub image: Option<SessionImage>,
    pub selected_detection_id: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,

    /// A detection request is in flight
    pub is_detecting: bool,
}

/// Detection counts per verification status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub modified: usize,
    pub manual: usize,
}

impl VerificationCounts {
    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected + self.modified + self.manual
    }

    /// Detections that will appear in a BOM
    pub fn eligible(&self) -> usize {
        self.approved + self.modified + self.manual
    }
}

impl SessionState {
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id())
    }

    pub fn detection(&self, detection_id: &str) -> Option<&Detection> {
        self.detections.iter().find(|d| d.id == detection_id)
    }

    pub(crate) fn detection_mut(&mut self, detection_id: &str) -> Option<&mut Detection> {
        self.detections.iter_mut().find(|d| d.id == detection_id)
    }

    pub fn selected_detection(&self) -> Option<&Detection> {
        self.selected_detection_id
            .as_deref()
            .and_then(|id| self.detection(id))
    }

    pub fn counts(&self) -> VerificationCounts {
        let mut counts = VerificationCounts::default();
        for detection in &self.detections {
            match detection.verification_status {
                VerificationStatus::Pending => counts.pending += 1,
                VerificationStatus::Approved => counts.approved += 1,
                VerificationStatus::Rejected => counts.rejected += 1,
                VerificationStatus::Modified => counts.modified += 1,
                VerificationStatus::Manual => counts.manual += 1,
            }
        }
        counts
    }
}
