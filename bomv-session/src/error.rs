//! Error types for bomv-session
//!
//! `GatewayError` describes transport failures; `OrchestratorError` is the
//! action-level taxonomy stored in session state.

use thiserror::Error;

/// Verification gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Identifier that cannot be placed in a URL path segment
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),

    /// Request abandoned through its cancellation token
    #[error("Request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_decode() {
            GatewayError::Parse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Result type for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Orchestrator action errors
///
/// The display text is what the operator sees in the error banner.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Failed to load session: {0}")]
    SessionLoad(String),

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("BOM generation failed: {0}")]
    BomGeneration(String),

    #[error("Failed to delete session: {0}")]
    SessionDelete(String),

    #[error("No session loaded")]
    NoActiveSession,

    #[error("Invalid request: {0}")]
    InvalidInput(String),
}

/// Result type for orchestrator actions
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
