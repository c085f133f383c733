//! cdp-crawler Discovery - Topology crawling over CDP neighbor tables
//!
//! This crate provides the crawl engine:
//! - CDP neighbor parsing and classification (switch, AP, phone, camera)
//! - Per-device SSH probes for identity and spanning-tree state
//! - Bounded breadth-first expansion per site
//! - AP serial lookup across a primary and a secondary wireless controller

pub mod access_point;
pub mod crawler;
pub mod dns;
pub mod neighbor;
pub mod probe;

#[cfg(test)]
mod testing;

pub use access_point::{format_mac, ApResolution, ControllerRole, MacFormatError, SerialLookup};
pub use crawler::{
    ControllerConfig, CrawlContext, CrawlError, CrawlerConfig, SiteCrawl, TopologyCrawler,
    DEFAULT_MAX_CONCURRENT_PROBES, DEFAULT_SCAN_DEPTH,
};
pub use dns::{DnsError, DnsSettings, HickoryNameResolver, NameResolver};
pub use neighbor::parse_cdp_neighbors;
pub use probe::{probe_device, ProbeError};
