//! # bomv-session
//!
//! Session orchestration for drawing verification: a client-side core that
//! drives a remote verification gateway through upload, detection, operator
//! verification and BOM generation.
//!
//! - `gateway`: the remote collaborator contract and its HTTP implementation
//! - `orchestrator`: session state, single-flight detection, verification actions
//! - `config`: gateway settings resolution

pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;

pub use error::{GatewayError, GatewayResult, OrchestratorError, OrchestratorResult};
pub use gateway::{DetectionConfig, ExportFormat, HttpGateway, UploadFile, VerificationGateway};
pub use orchestrator::{DetectionOutcome, OrchestratorOptions, SessionOrchestrator, SessionState};
