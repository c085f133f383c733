//! Configuration loading and validation

use anyhow::{bail, Result};
use cdpcrawl_core::SiteSpec;
use cdpcrawl_discovery::{
    ControllerConfig, CrawlerConfig, DnsSettings, DEFAULT_MAX_CONCURRENT_PROBES,
    DEFAULT_SCAN_DEPTH,
};
use cdpcrawl_ssh::SshOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub controllers: ControllerConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub dns: DnsSettings,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Depth for sites without their own `scan_depth`
    #[serde(default = "default_scan_depth")]
    pub default_scan_depth: u32,
    /// VLAN whose spanning-tree state is collected
    #[serde(default = "default_management_vlan")]
    pub management_vlan: u16,
    /// Host used to verify credentials before crawling
    #[serde(default)]
    pub credential_check_host: String,
    /// Probes in flight per BFS round
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            default_scan_depth: default_scan_depth(),
            management_vlan: default_management_vlan(),
            credential_check_host: String::new(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

fn default_scan_depth() -> u32 {
    DEFAULT_SCAN_DEPTH
}

fn default_management_vlan() -> u16 {
    1
}

fn default_max_concurrent_probes() -> usize {
    DEFAULT_MAX_CONCURRENT_PROBES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_ssh_port() -> u16 {
    cdpcrawl_ssh::SSH_PORT
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_command_timeout() -> u64 {
    60
}

impl Config {
    /// Reject settings the crawler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.crawl.default_scan_depth == 0 {
            bail!("crawl.default_scan_depth must be at least 1");
        }
        if self.crawl.credential_check_host.trim().is_empty() {
            bail!("crawl.credential_check_host is not set");
        }
        if self.controllers.primary.is_empty() || self.controllers.secondary.is_empty() {
            bail!("both controllers.primary and controllers.secondary must be set");
        }
        let mut names = HashSet::new();
        for site in &self.sites {
            site.validate()?;
            if !names.insert(site.name.as_str()) {
                bail!("site {} is defined more than once", site.name);
            }
        }
        Ok(())
    }

    /// Sites to crawl, restricted to `names` when any are given
    pub fn selected_sites(&self, names: &[String]) -> Result<Vec<SiteSpec>> {
        if names.is_empty() {
            return Ok(self.sites.clone());
        }

        let mut selected: Vec<SiteSpec> = Vec::with_capacity(names.len());
        for name in names {
            if selected.iter().any(|s| &s.name == name) {
                continue;
            }
            match self.sites.iter().find(|s| &s.name == name) {
                Some(site) => selected.push(site.clone()),
                None => bail!("site {} is not defined in the configuration", name),
            }
        }
        Ok(selected)
    }

    /// Convert to crawler configuration
    pub fn to_crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig {
            default_scan_depth: self.crawl.default_scan_depth,
            management_vlan: self.crawl.management_vlan,
            credential_check_host: self.crawl.credential_check_host.clone(),
            max_concurrent_probes: self.crawl.max_concurrent_probes,
            controllers: self.controllers.clone(),
        }
    }

    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            port: self.ssh.port,
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.ssh.command_timeout_secs),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), sites = config.sites.len(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };

    for site in &config.sites {
        site.validate()?;
    }
    Ok(config)
}

/// Save a sample configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        crawl: CrawlConfig {
            credential_check_host: "core-sw01".to_string(),
            ..CrawlConfig::default()
        },
        controllers: ControllerConfig {
            primary: "wlc-primary".to_string(),
            secondary: "wlc-secondary".to_string(),
        },
        ssh: SshConfig::default(),
        dns: DnsSettings::default(),
        sites: vec![SiteSpec {
            name: "hq".to_string(),
            site_id: Some(1),
            seed_device: "core-sw01".to_string(),
            scan_depth: Some(DEFAULT_SCAN_DEPTH),
        }],
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    info!(path = %path.display(), "Saved default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[crawl]
management_vlan = 20
credential_check_host = "ref-sw01"

[controllers]
primary = "wlc-5520"
secondary = "wlc-9800"

[dns]
search_domains = ["corp.example.com"]

[[site]]
name = "hq"
site_id = 12
seed_device = "core-sw01"

[[site]]
name = "branch"
seed_device = "br-sw01"
scan_depth = 2
"#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config() {
        let file = write_config(SAMPLE);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawl.default_scan_depth, DEFAULT_SCAN_DEPTH);
        assert_eq!(config.crawl.management_vlan, 20);
        assert_eq!(config.crawl.max_concurrent_probes, DEFAULT_MAX_CONCURRENT_PROBES);
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.dns.search_domains, vec!["corp.example.com".to_string()]);
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0].site_id, Some(12));
        assert_eq!(config.sites[0].effective_depth(config.crawl.default_scan_depth), 3);
        assert_eq!(config.sites[1].effective_depth(config.crawl.default_scan_depth), 2);
        assert!(config.validate().is_ok());

        let crawler = config.to_crawler_config();
        assert_eq!(crawler.controllers.primary, "wlc-5520");
        assert_eq!(crawler.credential_check_host, "ref-sw01");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();

        assert!(config.sites.is_empty());
        assert_eq!(config.crawl.default_scan_depth, DEFAULT_SCAN_DEPTH);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_depth_rejected() {
        let file = write_config(
            r#"
[[site]]
name = "hq"
seed_device = "core-sw01"
scan_depth = 0
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_duplicate_site_names_rejected() {
        let file = write_config(&format!(
            "{}\n[[site]]\nname = \"hq\"\nseed_device = \"core-sw02\"\n",
            SAMPLE
        ));
        let config = load_config(file.path()).unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hq"));
    }

    #[test]
    fn test_selected_sites() {
        let file = write_config(SAMPLE);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.selected_sites(&[]).unwrap().len(), 2);
        let branch = config.selected_sites(&["branch".to_string()]).unwrap();
        assert_eq!(branch.len(), 1);
        assert_eq!(branch[0].seed_device, "br-sw01");
        let repeated = config
            .selected_sites(&["hq".to_string(), "hq".to_string()])
            .unwrap();
        assert_eq!(repeated.len(), 1);
        assert!(config.selected_sites(&["nowhere".to_string()]).is_err());
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdp-crawler.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sites[0].name, "hq");
        assert_eq!(config.ssh_options().command_timeout, Duration::from_secs(60));
    }
}
