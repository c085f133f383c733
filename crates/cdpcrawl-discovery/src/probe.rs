//! Per-device SSH probe: identity, spanning-tree state and raw CDP table
//!
//! A probe either returns every field or none of them. Any session or parse
//! failure turns into a `scanned-failed` record carrying the unknown sentinel.

use cdpcrawl_core::{DeviceRecord, Inventory};
use cdpcrawl_ssh::{CliSession, Connector, Credentials, SessionError, SessionTarget};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crawler::CrawlContext;
use crate::dns::{resolve_host, NameResolver};
use crate::neighbor::{lookup_ap_macs, parse_cdp_neighbors};

/// Reads the chassis serial number
pub const SERIAL_COMMAND: &str = "show version | i Processor board ID";

/// Dumps every CDP neighbor entry
pub const NEIGHBOR_COMMAND: &str = "show cdp entry *";

const SERIAL_MARKER: &str = "Processor board ID";
const PID_MARKER: &str = "PID:";

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{host}: no {marker:?} in output of {command:?}")]
    UnexpectedOutput {
        host: String,
        command: String,
        marker: &'static str,
    },
}

/// Inventory line for the chassis with the given serial
pub fn inventory_command(serial: &str) -> String {
    format!("show inventory | i {}", serial)
}

/// Spanning-tree VLAN name as printed by IOS (`VLAN0001`)
pub fn vlan_marker(vlan: u16) -> String {
    format!("VLAN{:04}", vlan)
}

pub fn stp_root_command(vlan: u16) -> String {
    format!("show spanning-tree bridge address | i {}", vlan_marker(vlan))
}

pub fn stp_blocked_command(vlan: u16) -> String {
    format!("show spanning-tree blockedports | i {}", vlan_marker(vlan))
}

/// `Processor board ID FOC1922S481` -> `FOC1922S481`
pub fn parse_serial(output: &str) -> Option<String> {
    output
        .split_once(SERIAL_MARKER)
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(str::to_string)
}

/// `PID: WS-C2960X-48FPS-L , VID: V06  , SN: FOC2127S3M7` -> `WS-C2960X-48FPS-L`
pub fn parse_model(output: &str) -> Option<String> {
    let (_, rest) = output.split_once(PID_MARKER)?;
    let model = rest.split(',').next()?.trim();
    (!model.is_empty()).then(|| model.to_string())
}

/// `VLAN0001         0050.56bf.0001` -> `0050.56bf.0001`
pub fn parse_stp_root(output: &str, vlan: u16) -> String {
    let marker = vlan_marker(vlan);
    output
        .lines()
        .find_map(|line| line.split_once(marker.as_str()))
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .unwrap_or_default()
        .to_string()
}

/// `VLAN0001             Gi1/0/2, Gi1/0/3` -> `[Gi1/0/2, Gi1/0/3]`
pub fn parse_blocked_ports(output: &str, vlan: u16) -> Vec<String> {
    let marker = vlan_marker(vlan);
    output
        .lines()
        .filter_map(|line| line.split_once(marker.as_str()))
        .flat_map(|(_, rest)| rest.split(','))
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .map(str::to_string)
        .collect()
}

/// Probe one device and produce its record
///
/// Never fails: an unreachable device comes back as a failed record.
pub async fn probe_device(
    connector: &dyn Connector,
    resolver: &dyn NameResolver,
    ctx: &CrawlContext,
    hostname: &str,
) -> DeviceRecord {
    let (ip_addr, dns_name) = resolve_host(resolver, hostname).await;
    let target = SessionTarget::ios(hostname).with_address(ip_addr);

    match interrogate(connector, &target, &ctx.credentials, ctx.config.management_vlan).await {
        Ok(inventory) => {
            info!(
                host = %hostname,
                platform = %inventory.platform,
                neighbors = inventory.neighbors.len(),
                "SSH probe successful"
            );
            DeviceRecord::scanned(hostname, ip_addr, dns_name, inventory)
        }
        Err(e) => {
            warn!(host = %hostname, error = %e, "SSH probe failed, marking device unreachable");
            DeviceRecord::failed(hostname, ip_addr, dns_name)
        }
    }
}

/// Open one session, run the fixed command sequence and close it again
pub async fn interrogate(
    connector: &dyn Connector,
    target: &SessionTarget,
    credentials: &Credentials,
    management_vlan: u16,
) -> Result<Inventory, ProbeError> {
    let mut session = connector.connect(target, credentials).await?;
    let result = run_commands(session.as_mut(), management_vlan).await;

    if let Err(e) = session.close().await {
        debug!(host = %target.host, error = %e, "Error closing session");
    }

    result
}

async fn run_commands(
    session: &mut dyn CliSession,
    management_vlan: u16,
) -> Result<Inventory, ProbeError> {
    let host = session.host().to_string();

    let output = session.send_command(SERIAL_COMMAND).await?;
    let serial_num = parse_serial(&output).ok_or_else(|| ProbeError::UnexpectedOutput {
        host: host.clone(),
        command: SERIAL_COMMAND.to_string(),
        marker: SERIAL_MARKER,
    })?;

    let command = inventory_command(&serial_num);
    let output = session.send_command(&command).await?;
    let platform = parse_model(&output).ok_or_else(|| ProbeError::UnexpectedOutput {
        host: host.clone(),
        command,
        marker: PID_MARKER,
    })?;

    let cdp_output = session.send_command(NEIGHBOR_COMMAND).await?;
    let mut neighbors = parse_cdp_neighbors(&cdp_output);

    let output = session.send_command(&stp_root_command(management_vlan)).await?;
    let stp_root_mac = parse_stp_root(&output, management_vlan);
    if stp_root_mac.is_empty() {
        debug!(host = %host, "Could not determine STP root MAC");
    }

    let output = session.send_command(&stp_blocked_command(management_vlan)).await?;
    let stp_blocked_ports = parse_blocked_ports(&output, management_vlan);

    lookup_ap_macs(session, &mut neighbors).await;

    Ok(Inventory {
        platform,
        serial_num,
        stp_root_mac,
        stp_blocked_ports,
        neighbors,
    })
}

/// Pre-flight: open a session to a reference host and read its prompt
pub async fn verify_credentials(
    connector: &dyn Connector,
    host: &str,
    credentials: &Credentials,
) -> Result<(), SessionError> {
    let mut session = connector.connect(&SessionTarget::ios(host), credentials).await?;
    let result = session.find_prompt().await;
    if let Err(e) = session.close().await {
        debug!(host = %host, error = %e, "Error closing session");
    }

    let prompt = result?;
    info!(host = %host, prompt = %prompt, "Credential test successful");
    Ok(())
}
