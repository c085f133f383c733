//! Device and neighbor records discovered during a crawl

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Scan state of a device record or a neighbor entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStatus {
    /// Observed but not probed yet
    Unscanned,
    /// Probed successfully
    ScannedOk,
    /// Probe failed; terminal for this run
    ScannedFailed,
}

impl Default for ScanStatus {
    fn default() -> Self {
        Self::Unscanned
    }
}

impl ScanStatus {
    /// Whether a probe has already been attempted
    pub fn is_scanned(&self) -> bool {
        !matches!(self, Self::Unscanned)
    }
}

/// One entry of a device's CDP neighbor table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborRecord {
    /// Remote device identifier, domain suffix stripped
    pub device_id: String,
    /// Port on the remote device
    pub remote_port: String,
    /// Port on the device reporting the neighbor
    pub local_port: String,
    /// Advertised management address
    pub ip_addr: String,
    /// Platform string, vendor prefix stripped
    pub platform: String,
    pub is_ap: bool,
    pub is_phone: bool,
    pub is_camera: bool,
    /// MAC learned on `local_port`, only present for access points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap_mac_address: Option<String>,
    pub status: ScanStatus,
}

impl NeighborRecord {
    /// Create an empty, unclassified neighbor entry
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            remote_port: String::new(),
            local_port: String::new(),
            ip_addr: String::new(),
            platform: String::new(),
            is_ap: false,
            is_phone: false,
            is_camera: false,
            ap_mac_address: None,
            status: ScanStatus::Unscanned,
        }
    }

    /// A plain switch/router neighbor: none of the classification tags are set
    pub fn is_network_device(&self) -> bool {
        !self.is_ap && !self.is_phone && !self.is_camera
    }
}

/// Identity data read from a switch or router over its CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Model / PID
    pub platform: String,
    pub serial_num: String,
    /// Spanning-tree bridge address for the management VLAN
    pub stp_root_mac: String,
    /// Spanning-tree blocked ports for the management VLAN
    pub stp_blocked_ports: Vec<String>,
    /// Neighbor identifier -> neighbor entry
    pub neighbors: BTreeMap<String, NeighborRecord>,
}

/// Data assembled for an access point after controller lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointInfo {
    pub platform: String,
    /// Port on the AP side of the link
    pub ap_port: String,
    /// Parent switch that reported the AP
    pub switch: String,
    /// Port on the parent switch
    pub switchport: String,
    /// Colon-formatted MAC (raw text when it could not be normalized)
    pub mac_address: String,
    /// Serial number, if either controller knew the AP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_num: Option<String>,
}

/// What is known about a device beyond its name
///
/// `Unknown` is the failure sentinel: a failed probe never leaves partially
/// populated identity fields behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DeviceDetails {
    Unknown,
    Network(Inventory),
    AccessPoint(AccessPointInfo),
}

/// A node in a site's device table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identifier (host name)
    pub hostname: String,
    /// Address the host name resolved to
    pub ip_addr: Option<IpAddr>,
    /// Resolved DNS name, empty when resolution failed or disagreed
    pub dns_name: String,
    pub status: ScanStatus,
    pub details: DeviceDetails,
}

impl DeviceRecord {
    /// Placeholder for a device that has been observed but not probed
    pub fn unscanned(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip_addr: None,
            dns_name: String::new(),
            status: ScanStatus::Unscanned,
            details: DeviceDetails::Unknown,
        }
    }

    /// Record of a successful switch/router probe
    pub fn scanned(
        hostname: impl Into<String>,
        ip_addr: Option<IpAddr>,
        dns_name: impl Into<String>,
        inventory: Inventory,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            ip_addr,
            dns_name: dns_name.into(),
            status: ScanStatus::ScannedOk,
            details: DeviceDetails::Network(inventory),
        }
    }

    /// Record of a failed probe; every identity field is the `Unknown` sentinel
    pub fn failed(
        hostname: impl Into<String>,
        ip_addr: Option<IpAddr>,
        dns_name: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            ip_addr,
            dns_name: dns_name.into(),
            status: ScanStatus::ScannedFailed,
            details: DeviceDetails::Unknown,
        }
    }

    /// Record of an access point; scanned-ok only when a serial was found
    pub fn access_point(
        hostname: impl Into<String>,
        ip_addr: Option<IpAddr>,
        dns_name: impl Into<String>,
        info: AccessPointInfo,
    ) -> Self {
        let status = if info.serial_num.is_some() {
            ScanStatus::ScannedOk
        } else {
            ScanStatus::ScannedFailed
        };
        Self {
            hostname: hostname.into(),
            ip_addr,
            dns_name: dns_name.into(),
            status,
            details: DeviceDetails::AccessPoint(info),
        }
    }

    /// True when the device could not be probed (platform is the failure sentinel)
    pub fn is_failed(&self) -> bool {
        self.status == ScanStatus::ScannedFailed && matches!(self.details, DeviceDetails::Unknown)
    }

    pub fn is_access_point(&self) -> bool {
        matches!(self.details, DeviceDetails::AccessPoint(_))
    }

    pub fn platform(&self) -> Option<&str> {
        match &self.details {
            DeviceDetails::Network(inv) => Some(&inv.platform),
            DeviceDetails::AccessPoint(ap) => Some(&ap.platform),
            DeviceDetails::Unknown => None,
        }
    }

    pub fn serial_num(&self) -> Option<&str> {
        match &self.details {
            DeviceDetails::Network(inv) => Some(&inv.serial_num),
            DeviceDetails::AccessPoint(ap) => ap.serial_num.as_deref(),
            DeviceDetails::Unknown => None,
        }
    }

    /// Neighbor table of a scanned switch/router
    pub fn neighbors(&self) -> Option<&BTreeMap<String, NeighborRecord>> {
        match &self.details {
            DeviceDetails::Network(inv) => Some(&inv.neighbors),
            _ => None,
        }
    }

    pub fn neighbors_mut(&mut self) -> Option<&mut BTreeMap<String, NeighborRecord>> {
        match &mut self.details {
            DeviceDetails::Network(inv) => Some(&mut inv.neighbors),
            _ => None,
        }
    }
}
