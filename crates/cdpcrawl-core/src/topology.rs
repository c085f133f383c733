//! Per-site device graph
//!
//! The graph is a node table (`device id -> DeviceRecord`) with adjacency held
//! inside each scanned node's neighbor map. Every identifier is a key at most
//! once, so a device reachable from several parents is probed at most once.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, trace};

use crate::device::{DeviceRecord, NeighborRecord, ScanStatus};
use crate::site::SiteSpec;

/// An access point waiting for serial lookup, with the switch that reported it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApScanItem {
    pub parent: String,
    pub access_point: String,
}

/// Deferred AP work for one site, deduplicated by AP identifier
///
/// The first parent to report an AP wins; later reports are counted but dropped.
#[derive(Debug, Clone, Default)]
pub struct ApScanQueue {
    items: Vec<ApScanItem>,
    seen: HashSet<String>,
    duplicates: usize,
}

impl ApScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an AP, returns false if it was already queued
    pub fn push(&mut self, item: ApScanItem) -> bool {
        if self.seen.insert(item.access_point.clone()) {
            self.items.push(item);
            true
        } else {
            self.duplicates += 1;
            false
        }
    }

    pub fn items(&self) -> &[ApScanItem] {
        &self.items
    }

    /// Distinct AP identifiers in queue order
    pub fn access_points(&self) -> Vec<String> {
        self.items.iter().map(|i| i.access_point.clone()).collect()
    }

    /// How many reports were dropped as duplicates
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Work derived from the current graph for one BFS round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Plain network devices to probe this round
    pub candidates: BTreeSet<String>,
    /// APs seen on scanned devices, in discovery order
    pub access_points: Vec<ApScanItem>,
}

/// Device graph of a single site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteTopology {
    /// Site name
    pub site: String,
    pub site_id: Option<u64>,
    pub seed_device: String,
    /// Depth this site was crawled with
    pub scan_depth: u32,
    /// All nodes indexed by device id
    devices: BTreeMap<String, DeviceRecord>,
}

impl SiteTopology {
    /// Create an empty topology for a site
    pub fn new(spec: &SiteSpec, scan_depth: u32) -> Self {
        Self {
            site: spec.name.clone(),
            site_id: spec.site_id,
            seed_device: spec.seed_device.clone(),
            scan_depth: scan_depth.max(1),
            devices: BTreeMap::new(),
        }
    }

    /// Merge a probe result under its own identifier
    ///
    /// A record that has already been scanned (either outcome) is kept; the
    /// new one is dropped. Returns whether the record was stored.
    pub fn merge(&mut self, record: DeviceRecord) -> bool {
        match self.devices.get(&record.hostname) {
            Some(existing) if existing.status.is_scanned() => {
                debug!(
                    device = %record.hostname,
                    "Device already scanned, keeping existing record"
                );
                false
            }
            _ => {
                self.devices.insert(record.hostname.clone(), record);
                true
            }
        }
    }

    /// Insert or replace a record unconditionally
    pub fn insert(&mut self, record: DeviceRecord) {
        self.devices.insert(record.hostname.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Get all device records
    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// A device needs probing if it is unknown or still unscanned
    pub fn needs_probe(&self, id: &str) -> bool {
        self.devices
            .get(id)
            .map(|d| d.status == ScanStatus::Unscanned)
            .unwrap_or(true)
    }

    /// Look up the neighbor entry a parent holds for a device
    pub fn neighbor(&self, parent: &str, id: &str) -> Option<&NeighborRecord> {
        self.devices.get(parent)?.neighbors()?.get(id)
    }

    /// Scan every scanned-ok device's neighbor table for this round's work
    ///
    /// Plain network neighbors that still need probing become candidates
    /// (collapsed by identifier); AP neighbors are reported for the AP queue.
    /// Phones and cameras are never candidates.
    pub fn expansion(&self) -> Expansion {
        let mut expansion = Expansion::default();

        for device in self.devices.values() {
            if device.status != ScanStatus::ScannedOk {
                continue;
            }
            let Some(neighbors) = device.neighbors() else {
                continue;
            };

            for (id, neighbor) in neighbors {
                if neighbor.is_ap {
                    trace!(
                        parent = %device.hostname,
                        ap = %id,
                        "AP neighbor queued for controller lookup"
                    );
                    expansion.access_points.push(ApScanItem {
                        parent: device.hostname.clone(),
                        access_point: id.clone(),
                    });
                } else if neighbor.is_network_device() && self.needs_probe(id) {
                    trace!(parent = %device.hostname, neighbor = %id, "Neighbor added to frontier");
                    expansion.candidates.insert(id.clone());
                }
            }
        }

        expansion
    }

    /// Identifiers of devices whose probe failed
    pub fn failed_devices(&self) -> Vec<String> {
        self.devices
            .values()
            .filter(|d| d.is_failed())
            .map(|d| d.hostname.clone())
            .collect()
    }

    /// Copy each device's scan status onto the neighbor entries that point at it
    pub fn sync_neighbor_status(&mut self) {
        let statuses: BTreeMap<String, ScanStatus> = self
            .devices
            .iter()
            .map(|(id, d)| (id.clone(), d.status))
            .collect();

        for device in self.devices.values_mut() {
            if let Some(neighbors) = device.neighbors_mut() {
                for (id, neighbor) in neighbors.iter_mut() {
                    if let Some(status) = statuses.get(id) {
                        neighbor.status = *status;
                    }
                }
            }
        }
    }
}
