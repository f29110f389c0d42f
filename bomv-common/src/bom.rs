//! BOM aggregation
//!
//! Pure derivation of a priced BOM from a detection set. Same detections and
//! same pricing always produce the same items and summary; only `created_at`
//! differs between calls.

use crate::catalog::PricingLookup;
use crate::models::{BomData, BomItem, BomSummary, Detection, VerificationStatus};
use chrono::Utc;
use std::collections::BTreeMap;

/// VAT applied on top of the subtotal
pub const VAT_RATE: f64 = 0.10;

/// Aggregate eligible detections into a priced BOM snapshot
///
/// Eligible detections are `approved`, `modified` or `manual`. Lines are
/// grouped by effective class name and ordered by class name.
pub fn aggregate(
    session_id: &str,
    detections: &[Detection],
    pricing: &dyn PricingLookup,
) -> BomData {
    let mut groups: BTreeMap<&str, Vec<&Detection>> = BTreeMap::new();
    for detection in detections
        .iter()
        .filter(|d| d.verification_status.is_bom_eligible())
    {
        groups
            .entry(detection.effective_class_name())
            .or_default()
            .push(detection);
    }

    let items: Vec<BomItem> = groups
        .into_iter()
        .enumerate()
        .map(|(idx, (class_name, members))| build_item(idx + 1, class_name, &members, pricing))
        .collect();

    let summary = compute_summary(&items);
    let approved_count = detections
        .iter()
        .filter(|d| d.verification_status == VerificationStatus::Approved)
        .count();

    tracing::debug!(
        session_id = session_id,
        items = summary.total_items,
        quantity = summary.total_quantity,
        total = summary.total,
        "BOM aggregated"
    );

    BomData {
        session_id: session_id.to_string(),
        created_at: Utc::now(),
        items,
        summary,
        detection_count: detections.len(),
        approved_count,
    }
}

fn build_item(
    item_no: usize,
    class_name: &str,
    members: &[&Detection],
    pricing: &dyn PricingLookup,
) -> BomItem {
    let price = pricing.price_for(class_name).unwrap_or_default();
    let quantity = members.len();
    let confidence_sum: f64 = members.iter().map(|d| d.confidence).sum();

    BomItem {
        item_no,
        // Groups are never empty
        class_id: members.first().map(|d| d.class_id).unwrap_or_default(),
        class_name: class_name.to_string(),
        model_name: price.model_name,
        quantity,
        unit_price: price.unit_price,
        total_price: quantity as f64 * price.unit_price,
        avg_confidence: confidence_sum / quantity as f64,
        detection_ids: members.iter().map(|d| d.id.clone()).collect(),
        lead_time: price.lead_time,
        supplier: price.supplier,
    }
}

/// Totals for a set of BOM lines
pub fn compute_summary(items: &[BomItem]) -> BomSummary {
    let subtotal: f64 = items.iter().map(|item| item.total_price).sum();
    let vat = (subtotal * VAT_RATE).round();

    BomSummary {
        total_items: items.len(),
        total_quantity: items.iter().map(|item| item.quantity).sum(),
        subtotal,
        vat,
        total: subtotal + vat,
    }
}
