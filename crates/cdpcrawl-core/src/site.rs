//! Site definitions handed to the crawler by the site repository

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SiteError {
    #[error("Site {0} has no seed device")]
    MissingSeed(String),
    #[error("Site {0} has scan_depth 0 (must be at least 1)")]
    ZeroDepth(String),
}

/// A site to crawl, starting at its seed device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSpec {
    /// Site name
    pub name: String,
    /// Identifier in the inventory system
    #[serde(default)]
    pub site_id: Option<u64>,
    /// Device the crawl starts from
    pub seed_device: String,
    /// Per-site depth; falls back to the crawler default
    #[serde(default)]
    pub scan_depth: Option<u32>,
}

impl SiteSpec {
    pub fn new(name: impl Into<String>, seed_device: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site_id: None,
            seed_device: seed_device.into(),
            scan_depth: None,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.scan_depth = Some(depth);
        self
    }

    /// Depth to use for this site
    pub fn effective_depth(&self, default_depth: u32) -> u32 {
        self.scan_depth.unwrap_or(default_depth).max(1)
    }

    pub fn validate(&self) -> Result<(), SiteError> {
        if self.seed_device.trim().is_empty() {
            return Err(SiteError::MissingSeed(self.name.clone()));
        }
        if self.scan_depth == Some(0) {
            return Err(SiteError::ZeroDepth(self.name.clone()));
        }
        Ok(())
    }
}
