//! CDP neighbor-table parsing and neighbor classification
//!
//! Parsing is best-effort per field: a missing marker leaves that field empty
//! instead of dropping the record.

use cdpcrawl_core::NeighborRecord;
use cdpcrawl_ssh::CliSession;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Line separating entries in `show cdp entry *`
pub const RECORD_DELIMITER: &str = "-------------------------";

/// Capability advertised by lightweight access points
pub const AP_CAPABILITY: &str = "Trans-Bridge";

/// Capability prefix advertised by IP phones
pub const PHONE_CAPABILITY: &str = "Capabilities: Host Phone";

/// Cameras carry this in either the platform or the capability text
pub const CAMERA_MARKER: &str = "Network Camera";

const VENDOR_PREFIX: &str = "cisco ";

/// Drop a trailing DNS domain (`sw02.corp.example.com` -> `sw02`)
pub fn strip_domain(name: &str) -> &str {
    let name = name.trim();
    name.split_once('.').map(|(host, _)| host).unwrap_or(name)
}

/// Parse `show cdp entry *` output into neighbor id -> entry
pub fn parse_cdp_neighbors(output: &str) -> BTreeMap<String, NeighborRecord> {
    let mut neighbors = BTreeMap::new();

    // Text before the first delimiter is the command echo / banner
    for record in output.split(RECORD_DELIMITER).skip(1) {
        match parse_record(record) {
            Some(neighbor) => {
                trace!(neighbor = %neighbor.device_id, "Parsed CDP entry");
                neighbors.insert(neighbor.device_id.clone(), neighbor);
            }
            None => debug!("Skipping CDP entry without a Device ID"),
        }
    }

    debug!("Found {} CDP neighbors", neighbors.len());
    neighbors
}

fn parse_record(record: &str) -> Option<NeighborRecord> {
    let mut device_id: Option<String> = None;
    let mut neighbor = NeighborRecord::new("");

    for line in record.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Device ID:") {
            device_id = Some(strip_domain(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("Platform:") {
            let platform = match rest.split_once("Capabilities:") {
                Some((platform, _)) => platform,
                None => rest,
            };
            neighbor.platform = strip_vendor(platform.trim().trim_end_matches(',').trim());
        } else if let Some(rest) = line.strip_prefix("Interface:") {
            match rest.split_once("Port ID (outgoing port):") {
                Some((local, remote)) => {
                    neighbor.local_port = local.trim().trim_end_matches(',').trim().to_string();
                    neighbor.remote_port = remote.trim().to_string();
                }
                None => neighbor.local_port = rest.trim().trim_end_matches(',').to_string(),
            }
        } else if let Some(rest) = line
            .strip_prefix("IP address:")
            .or_else(|| line.strip_prefix("IPv4 address:"))
        {
            // Later lines win, so the management address replaces the entry address
            neighbor.ip_addr = rest.trim().to_string();
        }
    }

    neighbor.device_id = device_id.filter(|id| !id.is_empty())?;
    neighbor.is_ap = record.contains(AP_CAPABILITY);
    neighbor.is_phone = record.contains(PHONE_CAPABILITY);
    neighbor.is_camera = record.contains(CAMERA_MARKER);

    Some(neighbor)
}

/// Only the lower-case vendor tag is dropped; `Cisco IP Phone` is a product name
fn strip_vendor(platform: &str) -> String {
    platform
        .strip_prefix(VENDOR_PREFIX)
        .map(str::trim)
        .unwrap_or(platform)
        .to_string()
}

/// MAC address table lookup for one switch port
pub fn mac_table_command(local_port: &str) -> String {
    format!("show mac address-table interface {} | i STATIC|DYNAMIC", local_port)
}

/// Pull the MAC out of a `show mac address-table` row
///
/// Reference row: `250    7079.b362.9a7a    STATIC      Gi5/0/7`
pub fn parse_mac_table(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("STATIC") || line.contains("DYNAMIC"))
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

/// Read the MAC of every AP neighbor from the reporting device's MAC table
///
/// Runs on the session already open to the reporting device. Lookup failures
/// leave an empty MAC rather than failing the probe.
pub async fn lookup_ap_macs(
    session: &mut dyn CliSession,
    neighbors: &mut BTreeMap<String, NeighborRecord>,
) {
    for neighbor in neighbors.values_mut().filter(|n| n.is_ap) {
        if neighbor.local_port.is_empty() {
            debug!(ap = %neighbor.device_id, "AP has no local port, skipping MAC lookup");
            neighbor.ap_mac_address = Some(String::new());
            continue;
        }

        let command = mac_table_command(&neighbor.local_port);
        let mac = match session.send_command(&command).await {
            Ok(output) => parse_mac_table(&output),
            Err(e) => {
                debug!(
                    host = %session.host(),
                    ap = %neighbor.device_id,
                    port = %neighbor.local_port,
                    error = %e,
                    "Failed to read AP MAC address"
                );
                None
            }
        };

        if let Some(ref mac) = mac {
            debug!(ap = %neighbor.device_id, mac = %mac, "Found AP MAC address");
        }
        neighbor.ap_mac_address = Some(mac.unwrap_or_default());
    }
}
