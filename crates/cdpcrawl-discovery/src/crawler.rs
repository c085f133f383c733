//! Bounded breadth-first crawl of each site's device graph
//!
//! Every round derives its candidates from the neighbor tables of the devices
//! probed so far. Probes within a round run concurrently up to a fixed limit;
//! their results are merged into the site map by the crawler alone.

use cdpcrawl_core::{ApScanQueue, CrawlReport, DeviceRecord, SiteSpec, SiteTopology};
use cdpcrawl_ssh::{Connector, Credentials, SessionError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::access_point::resolve_access_points;
use crate::dns::NameResolver;
use crate::probe::{probe_device, verify_credentials};

/// Default crawl depth (seed plus two rounds)
pub const DEFAULT_SCAN_DEPTH: u32 = 3;

/// Default number of probes in flight per round
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 4;

/// Wireless controllers holding AP inventory, queried in this order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub primary: String,
    pub secondary: String,
}

/// Crawler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Depth for sites that do not set their own
    pub default_scan_depth: u32,
    /// VLAN whose spanning-tree state is read
    pub management_vlan: u16,
    /// Reference host for the credential pre-flight
    pub credential_check_host: String,
    /// Probes in flight per round, 1 for strictly sequential crawling
    pub max_concurrent_probes: usize,
    pub controllers: ControllerConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            default_scan_depth: DEFAULT_SCAN_DEPTH,
            management_vlan: 1,
            credential_check_host: String::new(),
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            controllers: ControllerConfig::default(),
        }
    }
}

/// Immutable run context passed to every probe
#[derive(Debug, Clone)]
pub struct CrawlContext {
    pub credentials: Credentials,
    pub config: CrawlerConfig,
}

impl CrawlContext {
    pub fn new(credentials: Credentials, config: CrawlerConfig) -> Self {
        Self { credentials, config }
    }
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Credential check against {host} failed")]
    CredentialCheck {
        host: String,
        #[source]
        source: SessionError,
    },
}

/// Result of crawling one site
#[derive(Debug, Clone)]
pub struct SiteCrawl {
    pub topology: SiteTopology,
    pub unfound_aps: Vec<String>,
    pub dns_mismatches: Vec<String>,
    /// Expansion rounds that actually probed something
    pub rounds: u32,
}

/// Drives the crawl across sites
pub struct TopologyCrawler {
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn NameResolver>,
    context: Arc<CrawlContext>,
}

impl TopologyCrawler {
    pub fn new(
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn NameResolver>,
        context: CrawlContext,
    ) -> Self {
        Self {
            connector,
            resolver,
            context: Arc::new(context),
        }
    }

    /// Crawl every site in order and return the aggregated report
    ///
    /// Only a failed credential pre-flight is an error; everything else ends
    /// up as data in the report.
    pub async fn run(&self, sites: &[SiteSpec]) -> Result<CrawlReport, CrawlError> {
        self.check_credentials().await?;

        let mut report = CrawlReport::new();
        info!(run_id = %report.run_id, sites = sites.len(), "Starting crawl");

        for site in sites {
            let crawl = self.crawl_site(site).await;
            report.add_site(crawl.topology, crawl.unfound_aps, crawl.dns_mismatches);
        }
        report.finish();

        if !report.failed_devices.is_empty() {
            error!(
                count = report.failed_devices.len(),
                devices = ?report.failed_devices,
                "Devices could not be scanned"
            );
        }
        if !report.unfound_aps.is_empty() {
            error!(
                count = report.unfound_aps.len(),
                access_points = ?report.unfound_aps,
                "APs not found on either controller"
            );
        }

        Ok(report)
    }

    /// Open a session to the reference host and read its prompt
    pub async fn check_credentials(&self) -> Result<(), CrawlError> {
        let host = &self.context.config.credential_check_host;
        debug!(host = %host, "Testing credentials");

        verify_credentials(self.connector.as_ref(), host, &self.context.credentials)
            .await
            .map_err(|source| {
                error!(host = %host, error = %source, "Credential test failed, aborting run");
                CrawlError::CredentialCheck {
                    host: host.clone(),
                    source,
                }
            })
    }

    /// Crawl one site: seed probe, expansion rounds, then AP resolution
    pub async fn crawl_site(&self, site: &SiteSpec) -> SiteCrawl {
        let depth = site.effective_depth(self.context.config.default_scan_depth);
        let mut topology = SiteTopology::new(site, depth);
        let mut ap_queue = ApScanQueue::new();
        let mut rounds = 0;

        info!(site = %site.name, seed = %site.seed_device, depth, "Crawling site");

        let seed = probe_device(
            self.connector.as_ref(),
            self.resolver.as_ref(),
            &self.context,
            &site.seed_device,
        )
        .await;
        if seed.is_failed() {
            warn!(
                site = %site.name,
                seed = %site.seed_device,
                "Seed device unreachable, nothing to expand"
            );
        }
        topology.merge(seed);

        for round in 1..depth {
            let expansion = topology.expansion();
            for item in expansion.access_points {
                if !ap_queue.push(item.clone()) {
                    debug!(ap = %item.access_point, parent = %item.parent, "AP already queued");
                }
            }

            // The graph cannot change without probes, so later rounds would match this one
            if expansion.candidates.is_empty() {
                debug!(site = %site.name, round, "Frontier empty, skipping remaining rounds");
                break;
            }

            info!(
                site = %site.name,
                round,
                candidates = expansion.candidates.len(),
                "Starting BFS round"
            );
            let candidates: Vec<String> = expansion.candidates.into_iter().collect();
            for record in self.probe_round(&candidates).await {
                topology.merge(record);
            }
            rounds += 1;
        }

        let resolution = resolve_access_points(
            self.connector.as_ref(),
            self.resolver.as_ref(),
            &self.context,
            &mut topology,
            &ap_queue,
        )
        .await;
        topology.sync_neighbor_status();

        info!(
            site = %site.name,
            devices = topology.len(),
            access_points = ap_queue.len(),
            failed = topology.failed_devices().len(),
            "Site complete"
        );

        SiteCrawl {
            topology,
            unfound_aps: resolution.unfound_aps,
            dns_mismatches: resolution.dns_mismatches,
            rounds,
        }
    }

    /// Probe a round's candidates, at most `max_concurrent_probes` at a time
    ///
    /// Records come back in candidate order.
    async fn probe_round(&self, candidates: &[String]) -> Vec<DeviceRecord> {
        let permits = Arc::new(Semaphore::new(self.context.config.max_concurrent_probes.max(1)));
        let mut tasks = JoinSet::new();

        for (index, host) in candidates.iter().cloned().enumerate() {
            let connector = self.connector.clone();
            let resolver = self.resolver.clone();
            let context = self.context.clone();
            let permits = permits.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let record =
                    probe_device(connector.as_ref(), resolver.as_ref(), &context, &host).await;
                (index, record)
            });
        }

        let mut results: Vec<Option<DeviceRecord>> = vec![None; candidates.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, record)) => results[index] = Some(record),
                Err(e) => warn!(error = %e, "Probe task aborted"),
            }
        }

        results
            .into_iter()
            .zip(candidates)
            .map(|(record, host)| {
                record.unwrap_or_else(|| DeviceRecord::failed(host.as_str(), None, ""))
            })
            .collect()
    }
}
