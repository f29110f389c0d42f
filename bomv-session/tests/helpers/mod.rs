//! Test Helper Utilities
//!
//! Shared fixtures for bomv-session integration tests

#![allow(dead_code)]

pub mod mock_gateway;

pub use mock_gateway::{manual_detection, MockGateway, IMAGE_HEIGHT, IMAGE_WIDTH};

use bomv_common::models::{BoundingBox, Detection, Session, SessionDetail, SessionStatus, VerificationStatus};
use bomv_session::gateway::DetectionConfig;
use bomv_session::orchestrator::{OrchestratorOptions, SessionOrchestrator};
use std::sync::Arc;

pub const SESSION_ID: &str = "session-pid-001";

/// Machine detection in `pending` status
pub fn detection(id: &str, class_name: &str, confidence: f64) -> Detection {
    Detection {
        id: id.to_string(),
        class_id: class_id_for(class_name),
        class_name: class_name.to_string(),
        confidence,
        bbox: BoundingBox::new(100.0, 100.0, 160.0, 150.0),
        model_id: "yolo_v11n".to_string(),
        verification_status: VerificationStatus::Pending,
        modified_class_name: None,
        modified_bbox: None,
    }
}

pub fn with_status(mut detection: Detection, status: VerificationStatus) -> Detection {
    detection.verification_status = status;
    detection
}

fn class_id_for(class_name: &str) -> i64 {
    match class_name {
        "valve" => 3,
        "pump" => 7,
        "gauge" => 11,
        _ => 0,
    }
}

/// Stored session in `uploaded` status
pub fn session_detail(session_id: &str, detections: Vec<Detection>) -> SessionDetail {
    let mut session = Session::new(session_id, "pid-drawing.png");
    session.status = if detections.is_empty() {
        SessionStatus::Uploaded
    } else {
        SessionStatus::Detected
    };
    session.detection_count = detections.len();
    SessionDetail {
        session,
        detections,
        approved_count: 0,
        rejected_count: 0,
        bom_data: None,
        image_width: IMAGE_WIDTH,
        image_height: IMAGE_HEIGHT,
    }
}

pub fn detection_config(confidence: f64) -> DetectionConfig {
    DetectionConfig {
        confidence,
        iou_threshold: 0.5,
        model_id: "yolo_v11n".to_string(),
        device: None,
    }
}

pub fn orchestrator(gateway: MockGateway) -> (SessionOrchestrator<MockGateway>, Arc<MockGateway>) {
    orchestrator_with(gateway, OrchestratorOptions::default())
}

pub fn orchestrator_with(
    gateway: MockGateway,
    options: OrchestratorOptions,
) -> (SessionOrchestrator<MockGateway>, Arc<MockGateway>) {
    let gateway = Arc::new(gateway);
    (SessionOrchestrator::new(Arc::clone(&gateway), options), gateway)
}

/// Orchestrator with `SESSION_ID` already loaded
pub async fn loaded(detections: Vec<Detection>) -> (SessionOrchestrator<MockGateway>, Arc<MockGateway>) {
    let (orchestrator, gateway) =
        orchestrator(MockGateway::new().with_session(session_detail(SESSION_ID, detections)));
    assert!(orchestrator.load_session(SESSION_ID).await);
    (orchestrator, gateway)
}
