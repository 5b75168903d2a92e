//! High-level service facade running the full pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::builder::{CanonicalModel, ModelBuilder};
use crate::enrichment::{
    EnrichmentBatcher, EnrichmentOptions, EnrichmentReport, EstimateCache, Estimates,
};
use crate::error::EngineError;
use crate::geo::GeoIndex;
use crate::matcher::{Matcher, attach_connections};
use crate::model::{Pop, Site, Topology, TopologySummary};
use crate::ports::{EstimatorPort, InventoryPort};
use crate::resolver::Resolver;

/// Public entry point for building a site-to-POP topology.
pub struct TopologyService {
    inventory: Arc<dyn InventoryPort>,
    estimator: Option<Arc<dyn EstimatorPort>>,
    index: Arc<GeoIndex>,
    options: EnrichmentOptions,
}

impl TopologyService {
    /// Create a service that resolves without enrichment.
    #[must_use]
    pub fn new(inventory: Arc<dyn InventoryPort>, index: Arc<GeoIndex>) -> Self {
        Self {
            inventory,
            estimator: None,
            index,
            options: EnrichmentOptions::default(),
        }
    }

    /// Enable name-based estimation for sites the configured-city tier cannot place.
    #[must_use]
    pub fn with_estimator(
        mut self,
        estimator: Arc<dyn EstimatorPort>,
        options: EnrichmentOptions,
    ) -> Self {
        self.estimator = Some(estimator);
        self.options = options;
        self
    }

    /// Lookup tables used by this service.
    #[must_use]
    pub fn index(&self) -> &GeoIndex {
        &self.index
    }

    /// Fetch the inventory, resolve every site, and match connected sites to POPs.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Inventory`] if sites or POPs cannot be fetched. Invalid records,
    /// failed estimation batches, and unplaceable sites are logged and reported in the result.
    pub async fn build_topology(&self) -> Result<Topology, EngineError> {
        let source = self.inventory.source().clone();
        info!(source = %source.id, "fetching inventory");
        let (raw_sites, raw_pops) =
            futures::try_join!(self.inventory.sites(), self.inventory.pops())?;

        let CanonicalModel {
            mut sites,
            pops,
            rejected_sites,
            rejected_pops,
        } = ModelBuilder::new(&self.index).build(raw_sites, raw_pops);

        let (estimates, enrichment) = self.enrich(&sites).await;
        let resolver = Resolver::new(&self.index);
        match &estimates {
            Some(estimates) => resolver.with_estimates(estimates).resolve_all(&mut sites),
            None => resolver.resolve_all(&mut sites),
        }

        let outcome = Matcher::new(&pops).connect_all(&sites);
        for site in &outcome.unmatched {
            warn!(site = %site, "connected site has no POP");
        }
        let pops = attach_connections(&pops, &outcome.connections);

        let mut summary = summarize(&sites, &pops);
        summary.connections = outcome.connections.len();
        summary.rejected_sites = rejected_sites.len();
        summary.rejected_pops = rejected_pops.len();
        info!(
            sites = summary.sites,
            pops = summary.pops,
            connections = summary.connections,
            unmatched = outcome.unmatched.len(),
            "topology built"
        );

        Ok(Topology {
            generated_at: Utc::now(),
            source,
            sites,
            pops,
            connections: outcome.connections,
            unmatched: outcome.unmatched,
            summary,
            enrichment,
        })
    }

    async fn enrich(&self, sites: &[Site]) -> (Option<Estimates>, Option<EnrichmentReport>) {
        let Some(estimator) = self.estimator.as_deref() else {
            return (None, None);
        };
        let candidates = Resolver::new(&self.index).tier_one_misses(sites);
        if candidates.is_empty() {
            return (None, None);
        }
        let cache = EstimateCache::new();
        let batcher = EnrichmentBatcher::new(estimator, &self.index, &cache, self.options);
        let (estimates, report) = batcher.enrich(&candidates).await;
        (Some(estimates), Some(report))
    }
}

/// Site, POP, and method counters for a resolved model.
#[must_use]
pub fn summarize(sites: &[Site], pops: &[Pop]) -> TopologySummary {
    let mut methods = BTreeMap::new();
    for site in sites {
        *methods.entry(site.method).or_insert(0) += 1;
    }
    let connected = sites.iter().filter(|site| site.is_connected()).count();
    TopologySummary {
        sites: sites.len(),
        connected,
        disconnected: sites.len() - connected,
        pops: pops.len(),
        empty_pops: pops.iter().filter(|pop| pop.connected_sites.is_empty()).count(),
        methods,
        ..TopologySummary::default()
    }
}
