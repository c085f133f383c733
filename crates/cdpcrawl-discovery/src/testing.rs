//! Scripted stand-ins for remote devices and DNS used by the unit tests

use async_trait::async_trait;
use cdpcrawl_ssh::{CliSession, Connector, Credentials, SessionError, SessionTarget};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use crate::crawler::{ControllerConfig, CrawlContext, CrawlerConfig};
use crate::dns::{DnsError, NameResolver};
use crate::neighbor::RECORD_DELIMITER;
use crate::probe::{inventory_command, stp_root_command, NEIGHBOR_COMMAND, SERIAL_COMMAND};

pub const CHECK_HOST: &str = "ref-sw01";
pub const PRIMARY_WLC: &str = "wlc-primary";
pub const SECONDARY_WLC: &str = "wlc-secondary";

/// Context pointing at the fixture hosts above
pub fn context() -> CrawlContext {
    CrawlContext::new(
        Credentials::new("netops", "secret"),
        CrawlerConfig {
            credential_check_host: CHECK_HOST.to_string(),
            controllers: ControllerConfig {
                primary: PRIMARY_WLC.to_string(),
                secondary: SECONDARY_WLC.to_string(),
            },
            ..CrawlerConfig::default()
        },
    )
}

#[derive(Default)]
struct Script {
    responses: HashMap<String, HashMap<String, String>>,
    unreachable: HashSet<String>,
    failing_close: HashSet<String>,
    connections: Vec<String>,
    commands: Vec<(String, String)>,
}

/// Connector answering from per-host command tables
///
/// Every connection attempt and every command is logged, in order.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, host: &str, command: &str, output: &str) {
        let mut script = self.script.lock().unwrap();
        script
            .responses
            .entry(host.to_string())
            .or_default()
            .insert(command.to_string(), output.to_string());
    }

    pub fn unreachable(&self, host: &str) {
        self.script.lock().unwrap().unreachable.insert(host.to_string());
    }

    /// Sessions to this host error out on close
    pub fn fail_close(&self, host: &str) {
        self.script.lock().unwrap().failing_close.insert(host.to_string());
    }

    /// Commands sent to a host across all its sessions
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Hosts a connection was attempted to, reachable or not
    pub fn connections(&self) -> Vec<String> {
        self.script.lock().unwrap().connections.clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        target: &SessionTarget,
        _credentials: &Credentials,
    ) -> Result<Box<dyn CliSession>, SessionError> {
        let mut script = self.script.lock().unwrap();
        script.connections.push(target.host.clone());
        if script.unreachable.contains(&target.host) {
            return Err(SessionError::Connect {
                host: target.host.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(ScriptedSession {
            host: target.host.clone(),
            script: self.script.clone(),
        }))
    }
}

struct ScriptedSession {
    host: String,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl CliSession for ScriptedSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn find_prompt(&mut self) -> Result<String, SessionError> {
        Ok(format!("{}#", self.host))
    }

    async fn send_command(&mut self, command: &str) -> Result<String, SessionError> {
        let mut script = self.script.lock().unwrap();
        script.commands.push((self.host.clone(), command.to_string()));
        Ok(script
            .responses
            .get(&self.host)
            .and_then(|table| table.get(command))
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.script.lock().unwrap().failing_close.contains(&self.host) {
            return Err(SessionError::Closed(self.host.clone()));
        }
        Ok(())
    }
}

/// Register the answers a healthy switch gives to a probe
pub fn ios_device(
    connector: &ScriptedConnector,
    host: &str,
    serial: &str,
    model: &str,
    cdp: &str,
) {
    connector.respond(host, SERIAL_COMMAND, &format!("Processor board ID {}", serial));
    connector.respond(
        host,
        &inventory_command(serial),
        &format!("PID: {} , VID: V01  , SN: {}", model, serial),
    );
    connector.respond(host, NEIGHBOR_COMMAND, cdp);
    connector.respond(host, &stp_root_command(1), "VLAN0001         0050.56bf.0001");
}

/// One `show cdp entry *` record, delimiter included
pub fn cdp_entry(
    device_id: &str,
    ip: &str,
    platform: &str,
    capabilities: &str,
    local_port: &str,
    remote_port: &str,
) -> String {
    format!(
        "{delim}\nDevice ID: {device_id}\nEntry address(es):\n  IP address: {ip}\n\
         Platform: cisco {platform},  Capabilities: {capabilities}\n\
         Interface: {local_port},  Port ID (outgoing port): {remote_port}\n\
         Holdtime : 150 sec\n\n",
        delim = RECORD_DELIMITER,
    )
}

/// Resolver backed by fixed forward and reverse tables
#[derive(Default)]
pub struct StaticResolver {
    forward: HashMap<String, IpAddr>,
    reverse: HashMap<IpAddr, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, name: &str, addr: IpAddr, ptr_name: &str) -> Self {
        self.forward.insert(name.to_string(), addr);
        self.reverse.insert(addr, ptr_name.to_string());
        self
    }
}

#[async_trait]
impl NameResolver for StaticResolver {
    async fn resolve_name(&self, name: &str) -> Result<IpAddr, DnsError> {
        self.forward
            .get(name)
            .copied()
            .ok_or_else(|| DnsError::NotFound(name.to_string()))
    }

    async fn resolve_addr(&self, addr: IpAddr) -> Result<String, DnsError> {
        self.reverse
            .get(&addr)
            .cloned()
            .ok_or_else(|| DnsError::NotFound(addr.to_string()))
    }
}
