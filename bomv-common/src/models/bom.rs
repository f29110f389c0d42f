//! Bill of Materials snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One BOM line: all eligible detections sharing an effective class name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomItem {
    /// 1-based line number
    pub item_no: usize,
    pub class_id: i64,
    pub class_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    pub quantity: usize,
    pub unit_price: f64,

    /// quantity × unit_price
    pub total_price: f64,

    /// Arithmetic mean of contributing detection confidences
    pub avg_confidence: f64,

    pub detection_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
}

/// BOM totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomSummary {
    pub total_items: usize,
    pub total_quantity: usize,
    pub subtotal: f64,
    pub vat: f64,
    pub total: f64,
}

/// Point-in-time BOM snapshot for a session
///
/// Regenerating produces a new snapshot that replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomData {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<BomItem>,
    pub summary: BomSummary,
    pub detection_count: usize,
    pub approved_count: usize,
}

impl BomData {
    /// Find the line for an effective class name
    pub fn item(&self, class_name: &str) -> Option<&BomItem> {
        self.items.iter().find(|item| item.class_name == class_name)
    }
}
