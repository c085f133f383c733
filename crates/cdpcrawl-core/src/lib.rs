//! cdp-crawler Core - Core types for CDP topology crawling
//!
//! This crate provides the foundational types for the crawler:
//! - Device and neighbor records with a tri-state scan status
//! - Per-site topology (node table plus adjacency held in each node's neighbor map)
//! - The deferred access-point scan queue
//! - Site definitions and the aggregate crawl report

pub mod device;
pub mod report;
pub mod site;
pub mod topology;

pub use device::{
    AccessPointInfo, DeviceDetails, DeviceRecord, Inventory, NeighborRecord, ScanStatus,
};
pub use report::{CrawlReport, SiteSummary};
pub use site::{SiteError, SiteSpec};
pub use topology::{ApScanItem, ApScanQueue, Expansion, SiteTopology};
