//! Forward and reverse name resolution for probed devices and APs

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{Name, Resolver, TokioResolver};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("No DNS record for {0}")]
    NotFound(String),
    #[error("DNS lookup for {name} failed: {reason}")]
    Lookup { name: String, reason: String },
    #[error("Invalid resolver configuration: {0}")]
    Config(String),
}

/// Resolver seam used by the probe and the AP resolver
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve a host name to its first address
    async fn resolve_name(&self, name: &str) -> Result<IpAddr, DnsError>;

    /// Resolve an address to its PTR name (trailing dot removed)
    async fn resolve_addr(&self, addr: IpAddr) -> Result<String, DnsError>;
}

/// Resolver settings; empty lists fall back to the system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsSettings {
    #[serde(default)]
    pub nameservers: Vec<IpAddr>,
    #[serde(default)]
    pub search_domains: Vec<String>,
}

/// hickory-backed resolver
pub struct HickoryNameResolver {
    resolver: TokioResolver,
}

impl HickoryNameResolver {
    pub fn new(settings: &DnsSettings) -> Result<Self, DnsError> {
        let (mut config, opts) = if settings.nameservers.is_empty() {
            hickory_resolver::system_conf::read_system_conf()
                .map_err(|e| DnsError::Config(e.to_string()))?
        } else {
            let group = NameServerConfigGroup::from_ips_clear(&settings.nameservers, 53, true);
            (
                ResolverConfig::from_parts(None, Vec::new(), group),
                ResolverOpts::default(),
            )
        };

        for domain in &settings.search_domains {
            let name = Name::from_str(domain).map_err(|e| DnsError::Config(e.to_string()))?;
            config.add_search(name);
        }

        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl NameResolver for HickoryNameResolver {
    async fn resolve_name(&self, name: &str) -> Result<IpAddr, DnsError> {
        let lookup = self
            .resolver
            .lookup_ip(name)
            .await
            .map_err(|e| DnsError::Lookup {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let addr = lookup
            .iter()
            .next()
            .ok_or_else(|| DnsError::NotFound(name.to_string()))?;
        trace!(name = %name, addr = %addr, "Resolved host name");
        Ok(addr)
    }

    async fn resolve_addr(&self, addr: IpAddr) -> Result<String, DnsError> {
        let lookup = self
            .resolver
            .reverse_lookup(addr)
            .await
            .map_err(|e| DnsError::Lookup {
                name: addr.to_string(),
                reason: e.to_string(),
            })?;
        let name = lookup
            .iter()
            .next()
            .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
            .ok_or_else(|| DnsError::NotFound(addr.to_string()))?;
        trace!(addr = %addr, name = %name, "Resolved address");
        Ok(name)
    }
}

/// Resolve a device identifier into `(address, dns name)`
///
/// Host names that resolve keep their own name as DNS name; literal addresses
/// get their PTR name. Failures yield `(None, "")` and are not errors.
pub async fn resolve_host(resolver: &dyn NameResolver, host: &str) -> (Option<IpAddr>, String) {
    if let Ok(addr) = host.parse::<IpAddr>() {
        let name = match resolver.resolve_addr(addr).await {
            Ok(name) => name,
            Err(e) => {
                debug!(host = %host, error = %e, "Reverse lookup failed");
                String::new()
            }
        };
        return (Some(addr), name);
    }

    match resolver.resolve_name(host).await {
        Ok(addr) => (Some(addr), host.to_string()),
        Err(e) => {
            debug!(host = %host, error = %e, "Name lookup failed");
            (None, String::new())
        }
    }
}
