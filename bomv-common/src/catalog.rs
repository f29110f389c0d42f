//! Pricing catalog used by local BOM aggregation
//!
//! Catalog file format (TOML):
//!
//! ```toml
//! [items.valve]
//! unit_price = 150000
//! model_name = "GV-50"
//! supplier = "Acme Valves"
//! lead_time = "2 weeks"
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Price information for a symbol class
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceEntry {
    pub unit_price: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
}

/// Pricing source for BOM aggregation
pub trait PricingLookup: Send + Sync {
    /// Price for an effective class name, `None` if the class is not priced
    fn price_for(&self, class_name: &str) -> Option<PriceEntry>;
}

/// In-memory catalog keyed by class name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceCatalog {
    #[serde(default)]
    items: HashMap<String, PriceEntry>,
}

impl PriceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_price(mut self, class_name: impl Into<String>, entry: PriceEntry) -> Self {
        self.insert(class_name, entry);
        self
    }

    pub fn insert(&mut self, class_name: impl Into<String>, entry: PriceEntry) {
        self.items.insert(class_name.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse catalog from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let catalog: PriceCatalog = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse pricing catalog failed: {}", e)))?;

        if let Some((name, _)) = catalog
            .items
            .iter()
            .find(|(_, entry)| !entry.unit_price.is_finite() || entry.unit_price < 0.0)
        {
            return Err(Error::InvalidInput(format!(
                "Pricing catalog entry '{}' has an invalid unit_price",
                name
            )));
        }

        Ok(catalog)
    }

    /// Load catalog from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            entries = catalog.len(),
            "Pricing catalog loaded"
        );
        Ok(catalog)
    }
}

impl PricingLookup for PriceCatalog {
    fn price_for(&self, class_name: &str) -> Option<PriceEntry> {
        self.items.get(class_name).cloned()
    }
}
