//! Verification gateway contract
//!
//! The orchestrator talks to storage, inference and BOM aggregation only
//! through this trait. `HttpGateway` is the production implementation.

pub mod http;

pub use http::HttpGateway;

use crate::error::GatewayResult;
use async_trait::async_trait;
use base64::Engine;
use bomv_common::models::{BomData, BoundingBox, Detection, Session, SessionDetail, VerificationStatus};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Drawing file accepted for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Extensions accepted for drawings
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "pdf"];

impl UploadFile {
    /// Build an upload, deriving the MIME type from the extension
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_for(&filename).to_string();
        Self {
            filename,
            mime_type,
            bytes,
        }
    }

    /// Read a drawing from disk
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "drawing".to_string());
        Ok(Self::new(filename, bytes))
    }

    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Local validation before anything is sent
    pub fn validate(&self) -> Result<(), String> {
        if self.bytes.is_empty() {
            return Err(format!("File is empty: {}", self.filename));
        }
        match self.extension() {
            Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            Some(ext) => Err(format!("Unsupported file type: .{}", ext)),
            None => Err(format!("File has no extension: {}", self.filename)),
        }
    }
}

fn mime_for(filename: &str) -> &'static str {
    let ext = std::path::Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: String,
}

/// Drawing image payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionImage {
    pub mime_type: String,
    pub image_base64: String,
}

impl SessionImage {
    /// Decode the base64 payload into raw image bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.image_base64.as_bytes())
    }
}

/// Detection request parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub confidence: f64,
    pub iou_threshold: f64,
    pub model_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence must be within [0, 1], got {}", self.confidence));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err("model_id must not be empty".to_string());
        }
        Ok(())
    }
}

impl From<&bomv_common::config::DetectionDefaults> for DetectionConfig {
    fn from(defaults: &bomv_common::config::DetectionDefaults) -> Self {
        Self {
            confidence: defaults.confidence,
            iou_threshold: defaults.iou_threshold,
            model_id: defaults.model_id.clone(),
            device: defaults.device.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub detections: Vec<Detection>,
    pub image_width: u32,
    pub image_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub detection_id: String,
    pub status: VerificationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkVerifyItem {
    pub detection_id: String,
    pub status: VerificationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualDetectionRequest {
    pub class_name: String,
    pub bbox: BoundingBox,
}

/// Export renderer formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Excel,
    Csv,
    Pdf,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Excel => "excel",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            "json" => Ok(ExportFormat::Json),
            _ => Err(format!("Unknown format: {}. Use excel, csv, pdf, or json", s)),
        }
    }
}

/// Remote collaborator contract used by the session orchestrator
#[async_trait]
pub trait VerificationGateway: Send + Sync {
    /// Store a drawing and create its session
    async fn upload(&self, file: &UploadFile) -> GatewayResult<UploadResponse>;

    async fn get_session(
        &self,
        session_id: &str,
        include_detections: bool,
    ) -> GatewayResult<SessionDetail>;

    /// Drawing image; `image_id` selects one image of a multi-image session
    async fn get_session_image(
        &self,
        session_id: &str,
        image_id: Option<&str>,
    ) -> GatewayResult<SessionImage>;

    /// Run detection. Implementations abandon the request once `cancel` fires
    /// and return `GatewayError::Cancelled`.
    async fn detect(
        &self,
        session_id: &str,
        config: &DetectionConfig,
        cancel: CancellationToken,
    ) -> GatewayResult<DetectionResponse>;

    async fn verify(&self, session_id: &str, request: &VerifyRequest) -> GatewayResult<()>;

    async fn bulk_verify(&self, session_id: &str, items: &[BulkVerifyItem]) -> GatewayResult<()>;

    async fn add_manual(
        &self,
        session_id: &str,
        request: &ManualDetectionRequest,
    ) -> GatewayResult<Detection>;

    async fn delete_detection(&self, session_id: &str, detection_id: &str) -> GatewayResult<()>;

    async fn generate_bom(&self, session_id: &str) -> GatewayResult<BomData>;

    async fn delete_session(&self, session_id: &str) -> GatewayResult<()>;

    async fn list_sessions(&self, limit: usize) -> GatewayResult<Vec<Session>>;

    /// Download URL of a rendered BOM export; never fetched by the orchestrator
    fn export_url(&self, session_id: &str, format: ExportFormat) -> GatewayResult<String>;
}
