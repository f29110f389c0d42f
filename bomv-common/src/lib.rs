//! # bomv Common Library
//!
//! Shared code for the bomv drawing verification workspace:
//! - Session, detection and BOM data model
//! - BOM aggregation and pricing catalog
//! - Configuration loading
//! - Session event bus
//! - Tracing initialisation

pub mod bom;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;

pub use error::{Error, Result};
