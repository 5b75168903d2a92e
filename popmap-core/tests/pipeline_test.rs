//! End-to-end runs of the topology service against in-memory collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono as _;
use futures as _;
use reqwest as _;
use serde as _;
use serde_json as _;
use thiserror as _;
use tracing as _;
use popmap_core::{
    CityRow, ConnectionStatus, Coordinate, CountryRow, EngineError, EnrichmentOptions,
    EstimateRequest, EstimatorPort, GeoIndex, InventoryPort, MatchMethod, PopId, PortError,
    RawEstimate, RawPop, RawSite, ResolutionMethod, Site, SourceMeta, Topology, TopologyService,
};

struct StaticInventory {
    meta: SourceMeta,
    sites: Vec<RawSite>,
    pops: Vec<RawPop>,
    offline: bool,
}

#[async_trait]
impl InventoryPort for StaticInventory {
    fn source(&self) -> &SourceMeta {
        &self.meta
    }

    async fn sites(&self) -> Result<Vec<RawSite>, PortError> {
        if self.offline {
            return Err(PortError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(self.sites.clone())
    }

    async fn pops(&self) -> Result<Vec<RawPop>, PortError> {
        Ok(self.pops.clone())
    }
}

/// Answers by site name; `Garbled` sites get an entry without a usable coordinate.
struct NameEstimator {
    meta: SourceMeta,
}

#[async_trait]
impl EstimatorPort for NameEstimator {
    fn source(&self) -> &SourceMeta {
        &self.meta
    }

    async fn estimate(&self, batch: &[EstimateRequest]) -> Result<Vec<RawEstimate>, PortError> {
        Ok(batch
            .iter()
            .map(|request| {
                let site_id = Some(request.site_id.0.clone());
                match request.name.as_str() {
                    "Boise Warehouse" => RawEstimate {
                        site_id,
                        city: Some("Boise".into()),
                        ..RawEstimate::default()
                    },
                    "Nampa Depot" => RawEstimate {
                        site_id,
                        city: Some("Nampa".into()),
                        latitude: Some(43.54),
                        longitude: Some(-116.56),
                    },
                    _ => RawEstimate {
                        site_id,
                        city: Some("Garbled".into()),
                        latitude: Some(400.0),
                        longitude: None,
                    },
                }
            })
            .collect())
    }
}

fn meta(id: &str) -> SourceMeta {
    SourceMeta {
        id: id.into(),
        name: id.to_uppercase(),
    }
}

fn index() -> Arc<GeoIndex> {
    let countries = [
        ("US", "United States", 38.0, -97.0),
        ("FR", "France", 46.0, 2.0),
        ("DE", "Germany", 51.0, 9.0),
    ]
    .map(|(code, name, lat, lon)| CountryRow {
        code: code.into(),
        name: Some(name.into()),
        latitude: lat,
        longitude: lon,
    });
    let cities = [
        ("Boise", "United States", "US", 43.61, -116.20),
        ("New York", "United States", "US", 40.7, -74.0),
        ("Frankfurt", "Germany", "DE", 50.11, 8.68),
    ]
    .map(|(city, country, iso2, lat, lon)| CityRow {
        city: city.into(),
        city_ascii: None,
        country: country.into(),
        iso2: Some(iso2.into()),
        latitude: lat,
        longitude: lon,
    });
    Arc::new(GeoIndex::build(countries, cities).expect("country table"))
}

fn raw_site(id: &str, name: &str, country: &str) -> RawSite {
    RawSite {
        id: Some(id.into()),
        name: Some(name.into()),
        country_code: Some(country.into()),
        connectivity: Some("Disconnected".into()),
        ..RawSite::default()
    }
}

fn connected(mut site: RawSite, lat: f64, lon: f64) -> RawSite {
    site.connectivity = Some("Connected".into());
    site.endpoint_latitude = Some(lat);
    site.endpoint_longitude = Some(lon);
    site
}

fn raw_pop(id: &str, name: &str, country: &str, city: &str) -> RawPop {
    RawPop {
        id: Some(id.into()),
        name: Some(name.into()),
        country: Some(country.into()),
        city: Some(city.into()),
        ..RawPop::default()
    }
}

fn inventory(sites: Vec<RawSite>) -> Arc<StaticInventory> {
    Arc::new(StaticInventory {
        meta: meta("static"),
        sites,
        pops: vec![
            raw_pop("10", "New York", "United States", "New York"),
            raw_pop("20", "Frankfurt", "Germany", "Frankfurt"),
            raw_pop("30", "Atlantis", "Atlantis", "Atlantis"),
        ],
        offline: false,
    })
}

fn site<'topology>(topology: &'topology Topology, id: &str) -> &'topology Site {
    topology
        .sites
        .iter()
        .find(|site| site.id.0 == id)
        .expect("site is part of the topology")
}

#[tokio::test]
async fn resolves_and_matches_without_enrichment() {
    let mut boise = raw_site("1", "HQ", "US");
    boise.city = Some("Boise".into());
    let sites = vec![
        boise,
        connected(raw_site("2", "Branch", "US"), 40.7, -74.0),
        raw_site("3", "Paris Office", "FR"),
        raw_site("4", "Nowhere", "ZZ"),
    ];
    let service = TopologyService::new(inventory(sites), index());
    let topology = service.build_topology().await.expect("inventory available");

    assert_eq!(site(&topology, "1").method, ResolutionMethod::ConfiguredCity, "scenario 1");
    assert_eq!(site(&topology, "2").method, ResolutionMethod::TunnelEndpoint, "scenario 2");
    assert_eq!(site(&topology, "3").method, ResolutionMethod::CountryCenter, "scenario 4");
    assert_eq!(topology.summary.rejected_sites, 1, "scenario 3: ZZ rejected");
    assert_eq!(topology.summary.rejected_pops, 1, "POP with unknown country rejected");
    assert!(topology.enrichment.is_none(), "enrichment disabled");

    assert_eq!(topology.connections.len(), 1, "one connected site");
    let connection = topology.connections.first().expect("one connection");
    assert_eq!(connection.pop, PopId("10".into()), "New York site goes to the New York POP");
    assert_eq!(connection.method, MatchMethod::NearestDistance, "no endpoint POP reference");
    assert!(connection.distance_km < 1.0, "same city");

    let empty: Vec<&str> = topology
        .pops
        .iter()
        .filter(|pop| pop.connected_sites.is_empty())
        .map(|pop| pop.id.0.as_str())
        .collect();
    assert_eq!(empty, ["20"], "POPs without sites are kept");
    assert_eq!(topology.summary.empty_pops, 1, "summary agrees");
}

#[tokio::test]
async fn malformed_entry_only_affects_its_site() {
    let sites = vec![
        raw_site("1", "Boise Warehouse", "US"),
        raw_site("2", "Nampa Depot", "US"),
        connected(raw_site("3", "Mystery Shed", "US"), 40.7, -74.0),
    ];
    let estimator = Arc::new(NameEstimator {
        meta: meta("names"),
    });
    let options = EnrichmentOptions {
        batch_size: 3,
        concurrency: 1,
    };
    let service =
        TopologyService::new(inventory(sites), index()).with_estimator(estimator, options);
    let topology = service.build_topology().await.expect("inventory available");

    assert_eq!(site(&topology, "1").method, ResolutionMethod::LlmCity, "indexed estimate");
    let nampa = site(&topology, "2");
    assert_eq!(nampa.method, ResolutionMethod::LlmCoordinate, "estimated coordinate");
    assert_eq!(nampa.coordinate, Coordinate::new(43.54, -116.56), "estimator coordinate");
    let shed = site(&topology, "3");
    assert_eq!(shed.method, ResolutionMethod::TunnelEndpoint, "malformed entry falls through");
    assert_eq!(shed.status, ConnectionStatus::Connected, "status preserved");

    let report = topology.enrichment.expect("enrichment ran");
    assert_eq!(report.batches, 1, "single batch");
    assert_eq!(report.failed_batches, 0, "batch itself succeeded");
    assert_eq!(report.malformed_entries, 1, "one bad entry");
    assert_eq!(report.estimated, 2, "two sites estimated");
}

#[tokio::test]
async fn rebuilding_gives_the_same_topology() {
    let sites = vec![
        connected(raw_site("1", "East", "US"), 40.0, -75.0),
        connected(raw_site("2", "Hesse", "DE"), 50.0, 8.5),
        raw_site("3", "France", "FR"),
    ];
    let service = TopologyService::new(inventory(sites), index());
    let first = service.build_topology().await.expect("first run");
    let second = service.build_topology().await.expect("second run");
    assert_eq!(first.sites, second.sites, "coordinates and methods are stable");
    assert_eq!(first.connections, second.connections, "connections are stable");
    assert_eq!(first.summary, second.summary, "summary is stable");
}

#[tokio::test]
async fn inventory_failure_aborts_the_run() {
    let inventory = Arc::new(StaticInventory {
        meta: meta("offline"),
        sites: Vec::new(),
        pops: Vec::new(),
        offline: true,
    });
    let result = TopologyService::new(inventory, index()).build_topology().await;
    assert!(
        matches!(result, Err(EngineError::Inventory(PortError::Api { status: 503, .. }))),
        "inventory errors propagate"
    );
}
