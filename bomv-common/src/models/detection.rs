//! Detection entity and verification lifecycle

use serde::{Deserialize, Serialize};

/// Verification status of a single detection
///
/// Machine detections start `Pending`. `Manual` is only assigned at creation
/// time for operator-drawn boxes and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
    Manual,
}

impl VerificationStatus {
    /// Contributes to the BOM (approved, modified or manual)
    pub fn is_bom_eligible(self) -> bool {
        matches!(
            self,
            VerificationStatus::Approved | VerificationStatus::Modified | VerificationStatus::Manual
        )
    }

    /// Valid target of an explicit operator verification call
    pub fn is_verification_target(self) -> bool {
        matches!(
            self,
            VerificationStatus::Approved | VerificationStatus::Rejected | VerificationStatus::Modified
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::Modified => "modified",
            VerificationStatus::Manual => "manual",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(VerificationStatus::Pending),
            "approved" | "approve" => Ok(VerificationStatus::Approved),
            "rejected" | "reject" => Ok(VerificationStatus::Rejected),
            "modified" | "modify" => Ok(VerificationStatus::Modified),
            "manual" => Ok(VerificationStatus::Manual),
            _ => Err(format!(
                "Unknown status: {}. Use approved, rejected, or modified",
                s
            )),
        }
    }
}

/// Axis-aligned box in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Finite coordinates with positive extent on both axes
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }
}

/// One candidate symbol found on a drawing
///
/// `bbox` is immutable once created; corrections live in `modified_bbox` and
/// `modified_class_name`, which take precedence for every consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub class_id: i64,
    pub class_name: String,

    /// Model confidence (0.0 to 1.0)
    pub confidence: f64,

    pub bbox: BoundingBox,

    #[serde(default)]
    pub model_id: String,

    pub verification_status: VerificationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_bbox: Option<BoundingBox>,
}

impl Detection {
    /// `modified_class_name` when present, otherwise `class_name`
    pub fn effective_class_name(&self) -> &str {
        self.modified_class_name
            .as_deref()
            .unwrap_or(&self.class_name)
    }

    /// `modified_bbox` when present, otherwise `bbox`
    pub fn effective_bbox(&self) -> &BoundingBox {
        self.modified_bbox.as_ref().unwrap_or(&self.bbox)
    }

    pub fn is_manual(&self) -> bool {
        self.verification_status == VerificationStatus::Manual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valve() -> Detection {
        Detection {
            id: "d-1".to_string(),
            class_id: 3,
            class_name: "valve".to_string(),
            confidence: 0.92,
            bbox: BoundingBox::new(10.0, 10.0, 50.0, 40.0),
            model_id: "yolo_v11n".to_string(),
            verification_status: VerificationStatus::Pending,
            modified_class_name: None,
            modified_bbox: None,
        }
    }

    #[test]
    fn test_effective_fields_prefer_modifications() {
        let mut det = valve();
        assert_eq!(det.effective_class_name(), "valve");
        assert_eq!(det.effective_bbox(), &det.bbox);

        det.modified_class_name = Some("gate_valve".to_string());
        det.modified_bbox = Some(BoundingBox::new(12.0, 12.0, 48.0, 38.0));
        assert_eq!(det.effective_class_name(), "gate_valve");
        assert_eq!(det.effective_bbox().x1, 12.0);
        // Original box is untouched
        assert_eq!(det.bbox.x1, 10.0);
    }

    #[test]
    fn test_bom_eligibility() {
        assert!(VerificationStatus::Approved.is_bom_eligible());
        assert!(VerificationStatus::Modified.is_bom_eligible());
        assert!(VerificationStatus::Manual.is_bom_eligible());
        assert!(!VerificationStatus::Pending.is_bom_eligible());
        assert!(!VerificationStatus::Rejected.is_bom_eligible());
    }

    #[test]
    fn test_bbox_validity() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(5.0, 0.0, 5.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, 3.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, 0.0, f64::NAN, 1.0).is_valid());
        assert_eq!(BoundingBox::new(0.0, 0.0, 4.0, 2.5).area(), 10.0);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Approved".parse::<VerificationStatus>().unwrap(), VerificationStatus::Approved);
        assert_eq!("reject".parse::<VerificationStatus>().unwrap(), VerificationStatus::Rejected);
        assert!("maybe".parse::<VerificationStatus>().is_err());
    }

    #[test]
    fn test_detection_wire_format() {
        let json = serde_json::to_value(valve()).unwrap();
        assert_eq!(json["verification_status"], "pending");
        assert_eq!(json["bbox"]["x2"], 50.0);
        assert!(json.get("modified_class_name").is_none());
    }
}
