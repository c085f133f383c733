//! Access point resolution through the wireless controllers
//!
//! APs are never probed directly. Their serial numbers come from the primary
//! controller, then from the secondary one for whatever the primary did not
//! know. The rest of the record is built from the parent switch's CDP entry.

use cdpcrawl_core::{AccessPointInfo, ApScanQueue, DeviceRecord, SiteTopology};
use cdpcrawl_ssh::{Connector, Credentials, SessionTarget};
use std::collections::BTreeMap;
use std::net::IpAddr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crawler::CrawlContext;
use crate::dns::NameResolver;
use crate::neighbor::strip_domain;

/// Serial marker in controller AP inventory output
pub const SERIAL_MARKER: &str = "SN: ";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unrecognised MAC address notation: {0:?}")]
pub struct MacFormatError(pub String);

/// Normalize a MAC to lower-case colon notation
///
/// Accepts Cisco dotted notation (`aaaa.bbbb.cccc`) and colon notation, so
/// applying it to its own output is a no-op.
pub fn format_mac(raw: &str) -> Result<String, MacFormatError> {
    let trimmed = raw.trim();
    let groups: Vec<&str> = if trimmed.contains('.') {
        trimmed.split('.').collect()
    } else {
        trimmed.split(':').collect()
    };

    let valid = match groups.len() {
        3 => groups.iter().all(|g| g.len() == 4),
        6 => !trimmed.contains('.') && groups.iter().all(|g| g.len() == 2),
        _ => false,
    };
    if !valid || !groups.iter().all(|g| g.chars().all(|c| c.is_ascii_hexdigit())) {
        return Err(MacFormatError(raw.to_string()));
    }

    let hex: String = groups.concat().to_ascii_lowercase();
    let octets: Vec<&str> = (0..12).step_by(2).map(|i| &hex[i..i + 2]).collect();
    Ok(octets.join(":"))
}

/// Which controller a lookup pass runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Primary,
    Secondary,
}

impl ControllerRole {
    /// AP inventory command for this controller's CLI dialect
    pub fn inventory_command(&self, access_point: &str) -> String {
        match self {
            Self::Primary => format!("show ap inventory {}", access_point),
            Self::Secondary => format!("show ap name {} inventory", access_point),
        }
    }
}

/// Serial number from the first `SN: ` line, if any
pub fn parse_ap_serial(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.split_once(SERIAL_MARKER))
        .map(|(_, rest)| rest.trim().to_string())
        .filter(|serial| !serial.is_empty())
}

/// Outcome of the two-controller serial lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialLookup {
    /// AP -> serial, from whichever controller answered first
    pub found: BTreeMap<String, String>,
    /// APs neither controller knew, in input order
    pub not_found: Vec<String>,
}

/// Query one controller for every AP in one session
///
/// Returns the APs it had no serial for. A controller that cannot be reached
/// is treated as knowing none of them.
async fn query_controller(
    connector: &dyn Connector,
    credentials: &Credentials,
    controller: &str,
    role: ControllerRole,
    access_points: &[String],
    found: &mut BTreeMap<String, String>,
) -> Vec<String> {
    if access_points.is_empty() {
        return Vec::new();
    }

    debug!(
        controller = %controller,
        role = ?role,
        count = access_points.len(),
        "Querying controller for AP serials"
    );
    let target = SessionTarget::wlc(controller);
    let mut session = match connector.connect(&target, credentials).await {
        Ok(session) => session,
        Err(e) => {
            warn!(
                controller = %controller,
                role = ?role,
                error = %e,
                "Controller unreachable, no APs resolved there"
            );
            return access_points.to_vec();
        }
    };

    let mut missing = Vec::new();
    for ap in access_points {
        let command = role.inventory_command(ap);
        match session.send_command(&command).await {
            Ok(output) => match parse_ap_serial(&output) {
                Some(serial) => {
                    debug!(
                        ap = %ap,
                        serial = %serial,
                        controller = %controller,
                        "Found AP serial"
                    );
                    found.insert(ap.clone(), serial);
                }
                None => missing.push(ap.clone()),
            },
            Err(e) => {
                debug!(
                    ap = %ap,
                    controller = %controller,
                    error = %e,
                    "AP inventory command failed"
                );
                missing.push(ap.clone());
            }
        }
    }

    if let Err(e) = session.close().await {
        debug!(controller = %controller, error = %e, "Error closing controller session");
    }

    missing
}

/// Primary pass, then a secondary pass with only the primary's misses
pub async fn lookup_serials(
    connector: &dyn Connector,
    credentials: &Credentials,
    primary: &str,
    secondary: &str,
    access_points: &[String],
) -> SerialLookup {
    let mut found = BTreeMap::new();

    let misses = query_controller(
        connector,
        credentials,
        primary,
        ControllerRole::Primary,
        access_points,
        &mut found,
    )
    .await;

    let not_found = query_controller(
        connector,
        credentials,
        secondary,
        ControllerRole::Secondary,
        &misses,
        &mut found,
    )
    .await;

    SerialLookup { found, not_found }
}

/// Unresolved APs and naming problems for one site
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApResolution {
    pub unfound_aps: Vec<String>,
    pub dns_mismatches: Vec<String>,
}

/// DNS name for an AP, or `None` when the PTR name disagrees with the identifier
async fn check_ap_dns(
    resolver: &dyn NameResolver,
    access_point: &str,
    cdp_addr: Option<IpAddr>,
) -> (Option<IpAddr>, Option<String>) {
    let addr = match resolver.resolve_name(access_point).await {
        Ok(addr) => Some(addr),
        Err(e) => {
            debug!(
                ap = %access_point,
                error = %e,
                "AP name lookup failed, using CDP address"
            );
            cdp_addr
        }
    };

    let Some(addr) = addr else {
        return (None, None);
    };

    let name = match resolver.resolve_addr(addr).await {
        Ok(name) => strip_domain(&name).to_string(),
        Err(e) => {
            debug!(ap = %access_point, addr = %addr, error = %e, "AP reverse lookup failed");
            String::new()
        }
    };

    if name.eq_ignore_ascii_case(access_point) {
        (Some(addr), Some(name))
    } else {
        (Some(addr), None)
    }
}

/// Build AP records for every queued AP and fill in their serials
pub async fn resolve_access_points(
    connector: &dyn Connector,
    resolver: &dyn NameResolver,
    ctx: &CrawlContext,
    topology: &mut SiteTopology,
    queue: &ApScanQueue,
) -> ApResolution {
    let mut resolution = ApResolution::default();
    if queue.is_empty() {
        return resolution;
    }

    let mut records = Vec::with_capacity(queue.len());
    for item in queue.items() {
        if topology.get(&item.access_point).is_some_and(|d| !d.is_access_point()) {
            warn!(
                site = %topology.site,
                ap = %item.access_point,
                "AP identifier collides with a probed device, skipping"
            );
            continue;
        }

        let Some(neighbor) = topology.neighbor(&item.parent, &item.access_point) else {
            debug!(ap = %item.access_point, parent = %item.parent, "Parent no longer lists AP");
            continue;
        };

        let raw_mac = neighbor.ap_mac_address.clone().unwrap_or_default();
        let mac_address = match format_mac(&raw_mac) {
            Ok(mac) => mac,
            Err(e) => {
                debug!(ap = %item.access_point, error = %e, "Keeping raw AP MAC");
                raw_mac
            }
        };

        let info = AccessPointInfo {
            platform: neighbor.platform.clone(),
            ap_port: neighbor.remote_port.clone(),
            switch: item.parent.clone(),
            switchport: neighbor.local_port.clone(),
            mac_address,
            serial_num: None,
        };
        let cdp_addr = neighbor.ip_addr.parse::<IpAddr>().ok();

        let (ip_addr, dns_name) = check_ap_dns(resolver, &item.access_point, cdp_addr).await;
        let dns_name = match dns_name {
            Some(name) => name,
            None => {
                warn!(
                    site = %topology.site,
                    ap = %item.access_point,
                    ip = %neighbor.ip_addr,
                    "DNS name does not match AP hostname"
                );
                resolution.dns_mismatches.push(item.access_point.clone());
                String::new()
            }
        };

        // Address as advertised to the parent switch; DNS only fills a gap
        let address = cdp_addr.or(ip_addr);
        records.push((item.access_point.clone(), address, dns_name, info));
    }

    let names: Vec<String> = records.iter().map(|(name, ..)| name.clone()).collect();
    let lookup = lookup_serials(
        connector,
        &ctx.credentials,
        &ctx.config.controllers.primary,
        &ctx.config.controllers.secondary,
        &names,
    )
    .await;

    for (name, ip_addr, dns_name, mut info) in records {
        info.serial_num = lookup.found.get(&name).cloned();
        topology.insert(DeviceRecord::access_point(name, ip_addr, dns_name, info));
    }

    info!(
        site = %topology.site,
        resolved = lookup.found.len(),
        unresolved = lookup.not_found.len(),
        "AP serial lookup complete"
    );
    resolution.unfound_aps = lookup.not_found;
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, ScriptedConnector, StaticResolver, PRIMARY_WLC, SECONDARY_WLC};
    use cdpcrawl_core::{ApScanItem, Inventory, NeighborRecord, ScanStatus, SiteSpec};
    use std::net::Ipv4Addr;

    fn aps(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac("aaaa.bbbb.cccc").unwrap(), "aa:aa:bb:bb:cc:cc");
        assert_eq!(format_mac("7079.B362.9A7A").unwrap(), "70:79:b3:62:9a:7a");
        assert_eq!(format_mac("70:79:b3:62:9a:7a").unwrap(), "70:79:b3:62:9a:7a");

        let once = format_mac("aaaa.bbbb.cccc").unwrap();
        assert_eq!(format_mac(&once).unwrap(), once);
    }

    #[test]
    fn test_format_mac_rejects_other_notations() {
        assert!(format_mac("").is_err());
        assert!(format_mac("aabb.ccdd").is_err());
        assert!(format_mac("aa-bb-cc-dd-ee-ff").is_err());
        assert!(format_mac("zzzz.bbbb.cccc").is_err());
        assert_eq!(
            format_mac("not-a-mac"),
            Err(MacFormatError("not-a-mac".to_string()))
        );
    }

    #[test]
    fn test_parse_ap_serial() {
        let output = "NAME: \"AP2800\"    , DESCR: \"Cisco Aironet 2800 Series\"\n\
                      PID: AIR-AP2802I-B-K9 , VID: 02, SN: FGL2231A0BC";
        assert_eq!(parse_ap_serial(output), Some("FGL2231A0BC".to_string()));
        assert_eq!(parse_ap_serial("AP ap-x not found"), None);
    }

    #[tokio::test]
    async fn test_secondary_only_sees_primary_misses() {
        let connector = ScriptedConnector::new();
        connector.respond(
            PRIMARY_WLC,
            &ControllerRole::Primary.inventory_command("ap-01"),
            "PID: AIR-AP2802I-B-K9 , VID: 02, SN: FGL0001",
        );
        connector.respond(
            SECONDARY_WLC,
            &ControllerRole::Secondary.inventory_command("ap-02"),
            "PID: C9120AXI-B , VID: 01, SN: FGL0002",
        );
        let creds = Credentials::new("netops", "secret");

        let lookup = lookup_serials(
            &connector,
            &creds,
            PRIMARY_WLC,
            SECONDARY_WLC,
            &aps(&["ap-01", "ap-02", "ap-03"]),
        )
        .await;

        assert_eq!(lookup.found.get("ap-01").map(String::as_str), Some("FGL0001"));
        assert_eq!(lookup.found.get("ap-02").map(String::as_str), Some("FGL0002"));
        assert_eq!(lookup.not_found, aps(&["ap-03"]));

        let secondary_log = connector.commands_for(SECONDARY_WLC);
        assert!(secondary_log.iter().all(|c| !c.contains("ap-01")));
        assert_eq!(secondary_log.len(), 2);
        assert_eq!(
            connector.connections(),
            vec![PRIMARY_WLC.to_string(), SECONDARY_WLC.to_string()]
        );
    }

    #[tokio::test]
    async fn test_secondary_skipped_when_primary_resolves_all() {
        let connector = ScriptedConnector::new();
        connector.respond(
            PRIMARY_WLC,
            &ControllerRole::Primary.inventory_command("ap-01"),
            "SN: FGL0001",
        );

        let lookup = lookup_serials(
            &connector,
            &Credentials::new("netops", "secret"),
            PRIMARY_WLC,
            SECONDARY_WLC,
            &aps(&["ap-01"]),
        )
        .await;

        assert!(lookup.not_found.is_empty());
        assert_eq!(connector.connections(), vec![PRIMARY_WLC.to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_primary_falls_through() {
        let connector = ScriptedConnector::new();
        connector.unreachable(PRIMARY_WLC);
        connector.respond(
            SECONDARY_WLC,
            &ControllerRole::Secondary.inventory_command("ap-01"),
            "SN: FGL0001",
        );

        let lookup = lookup_serials(
            &connector,
            &Credentials::new("netops", "secret"),
            PRIMARY_WLC,
            SECONDARY_WLC,
            &aps(&["ap-01", "ap-02"]),
        )
        .await;

        assert_eq!(lookup.found.len(), 1);
        assert_eq!(lookup.not_found, aps(&["ap-02"]));
    }

    #[tokio::test]
    async fn test_both_controllers_down() {
        let connector = ScriptedConnector::new();
        connector.unreachable(PRIMARY_WLC);
        connector.unreachable(SECONDARY_WLC);

        let lookup = lookup_serials(
            &connector,
            &Credentials::new("netops", "secret"),
            PRIMARY_WLC,
            SECONDARY_WLC,
            &aps(&["ap-01", "ap-02"]),
        )
        .await;

        assert!(lookup.found.is_empty());
        assert_eq!(lookup.not_found, aps(&["ap-01", "ap-02"]));
    }

    fn site_with_aps() -> SiteTopology {
        let mut topology = SiteTopology::new(&SiteSpec::new("hq", "core-sw01"), 2);
        let ap = |id: &str, ip: &str, mac: &str, port: &str| NeighborRecord {
            ip_addr: ip.to_string(),
            platform: "AIR-AP2802I-B-K9".to_string(),
            local_port: port.to_string(),
            remote_port: "GigabitEthernet0".to_string(),
            is_ap: true,
            ap_mac_address: Some(mac.to_string()),
            ..NeighborRecord::new(id)
        };
        let neighbors = [
            ap("ap-fl2-01", "10.1.20.31", "7079.b362.9a7a", "Gi1/0/5"),
            ap("ap-fl2-02", "10.1.20.32", "", "Gi1/0/6"),
        ]
        .into_iter()
        .map(|n| (n.device_id.clone(), n))
        .collect();

        topology.merge(DeviceRecord::scanned(
            "core-sw01",
            None,
            "core-sw01",
            Inventory {
                platform: "WS-C3850-48P".to_string(),
                serial_num: "FOC1".to_string(),
                stp_root_mac: String::new(),
                stp_blocked_ports: Vec::new(),
                neighbors,
            },
        ));
        topology
    }

    fn queue(items: &[(&str, &str)]) -> ApScanQueue {
        let mut queue = ApScanQueue::new();
        for (parent, ap) in items {
            queue.push(ApScanItem {
                parent: parent.to_string(),
                access_point: ap.to_string(),
            });
        }
        queue
    }

    #[tokio::test]
    async fn test_resolve_builds_ap_records() {
        let connector = ScriptedConnector::new();
        connector.respond(
            PRIMARY_WLC,
            &ControllerRole::Primary.inventory_command("ap-fl2-01"),
            "SN: FGL2231A0BC",
        );

        let ip1 = IpAddr::V4(Ipv4Addr::new(10, 1, 20, 31));
        let ip2 = IpAddr::V4(Ipv4Addr::new(10, 1, 20, 32));
        let resolver = StaticResolver::new()
            .with_host("ap-fl2-01", ip1, "ap-fl2-01.corp.example.com")
            .with_host("ap-fl2-02", ip2, "printer-7.corp.example.com");

        let mut topology = site_with_aps();
        let resolution = resolve_access_points(
            &connector,
            &resolver,
            &context(),
            &mut topology,
            &queue(&[("core-sw01", "ap-fl2-01"), ("core-sw01", "ap-fl2-02")]),
        )
        .await;

        assert_eq!(resolution.unfound_aps, aps(&["ap-fl2-02"]));
        assert_eq!(resolution.dns_mismatches, aps(&["ap-fl2-02"]));

        let ap1 = topology.get("ap-fl2-01").unwrap();
        assert_eq!(ap1.status, ScanStatus::ScannedOk);
        assert_eq!(ap1.ip_addr, Some(ip1));
        assert_eq!(ap1.dns_name, "ap-fl2-01");
        assert_eq!(ap1.serial_num(), Some("FGL2231A0BC"));
        let cdpcrawl_core::DeviceDetails::AccessPoint(info) = &ap1.details else {
            panic!("expected AP details");
        };
        assert_eq!(info.switch, "core-sw01");
        assert_eq!(info.switchport, "Gi1/0/5");
        assert_eq!(info.ap_port, "GigabitEthernet0");
        assert_eq!(info.mac_address, "70:79:b3:62:9a:7a");

        let ap2 = topology.get("ap-fl2-02").unwrap();
        assert_eq!(ap2.status, ScanStatus::ScannedFailed);
        assert_eq!(ap2.dns_name, "");
        assert_eq!(ap2.serial_num(), None);
        assert!(!ap2.is_failed());
    }

    #[tokio::test]
    async fn test_ap_address_comes_from_cdp() {
        let connector = ScriptedConnector::new();
        let dns_ip = IpAddr::V4(Ipv4Addr::new(10, 1, 99, 31));
        let resolver =
            StaticResolver::new().with_host("ap-fl2-01", dns_ip, "ap-fl2-01.corp.example.com");

        let mut topology = site_with_aps();
        resolve_access_points(
            &connector,
            &resolver,
            &context(),
            &mut topology,
            &queue(&[("core-sw01", "ap-fl2-01")]),
        )
        .await;

        let ap = topology.get("ap-fl2-01").unwrap();
        assert_eq!(ap.ip_addr, Some(IpAddr::V4(Ipv4Addr::new(10, 1, 20, 31))));
        assert_eq!(ap.dns_name, "ap-fl2-01");
    }

    #[tokio::test]
    async fn test_ap_colliding_with_device_is_skipped() {
        let connector = ScriptedConnector::new();
        let mut topology = site_with_aps();
        topology.merge(DeviceRecord::failed("ap-fl2-01", None, ""));

        let resolution = resolve_access_points(
            &connector,
            &StaticResolver::new(),
            &context(),
            &mut topology,
            &queue(&[("core-sw01", "ap-fl2-01")]),
        )
        .await;

        assert!(topology.get("ap-fl2-01").unwrap().is_failed());
        assert!(resolution.unfound_aps.is_empty());
        assert!(connector.connections().is_empty());
    }
}
