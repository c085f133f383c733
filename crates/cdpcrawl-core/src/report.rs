//! Aggregate result of a crawl run, handed to export/sync stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::topology::SiteTopology;

/// Completed crawl across all sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Site name -> device graph
    pub sites: BTreeMap<String, SiteTopology>,
    /// Devices that could not be probed, across all sites
    pub failed_devices: Vec<String>,
    /// APs neither controller knew, across all sites
    pub unfound_aps: Vec<String>,
    /// APs whose reverse DNS name disagreed with their CDP name
    pub dns_mismatches: Vec<String>,
}

/// Short per-site numbers for console output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSummary {
    pub site: String,
    pub devices: usize,
    pub access_points: usize,
    pub failed: usize,
}

impl CrawlReport {
    /// Start a new report stamped with the current time
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            sites: BTreeMap::new(),
            failed_devices: Vec::new(),
            unfound_aps: Vec::new(),
            dns_mismatches: Vec::new(),
        }
    }

    /// Add a finished site and fold its failures into the aggregates
    pub fn add_site(
        &mut self,
        topology: SiteTopology,
        unfound_aps: Vec<String>,
        dns_mismatches: Vec<String>,
    ) {
        self.failed_devices.extend(topology.failed_devices());
        self.unfound_aps.extend(unfound_aps);
        self.dns_mismatches.extend(dns_mismatches);
        self.sites.insert(topology.site.clone(), topology);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn summaries(&self) -> Vec<SiteSummary> {
        self.sites
            .values()
            .map(|topo| SiteSummary {
                site: topo.site.clone(),
                devices: topo.devices().filter(|d| !d.is_access_point()).count(),
                access_points: topo.devices().filter(|d| d.is_access_point()).count(),
                failed: topo.failed_devices().len(),
            })
            .collect()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for CrawlReport {
    fn default() -> Self {
        Self::new()
    }
}
