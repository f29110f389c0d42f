//! Data model for drawing-analysis sessions
//!
//! Mirrors the wire format of the verification gateway (snake_case JSON).

pub mod bom;
pub mod detection;
pub mod session;

pub use bom::{BomData, BomItem, BomSummary};
pub use detection::{BoundingBox, Detection, VerificationStatus};
pub use session::{InvalidTransition, Session, SessionDetail, SessionStatus, StatusTransition};
