//! Five-tier coordinate resolution chain.
//!
//! Each tier is a pure strategy `(site, context) -> Option<Coordinate>`; [`CHAIN`] lists them in
//! priority order and the first hit wins. The estimate-based tiers only fire when the context
//! carries enrichment results, so a run without enrichment falls through configured city, tunnel
//! endpoint, and country center.

use tracing::debug;

use crate::enrichment::Estimates;
use crate::geo::GeoIndex;
use crate::model::{Coordinate, ResolutionMethod, Site};

/// Read-only inputs shared by all strategies.
#[derive(Clone, Copy)]
pub struct ResolveContext<'ctx> {
    /// Country and city tables.
    pub index: &'ctx GeoIndex,
    /// Enrichment results, `None` when enrichment is disabled.
    pub estimates: Option<&'ctx Estimates>,
}

/// One tier of the chain.
pub type Strategy = fn(&Site, &ResolveContext<'_>) -> Option<Coordinate>;

/// Tiers in priority order.
pub const CHAIN: [(ResolutionMethod, Strategy); 5] = [
    (ResolutionMethod::ConfiguredCity, configured_city),
    (ResolutionMethod::LlmCity, llm_city),
    (ResolutionMethod::LlmCoordinate, llm_coordinate),
    (ResolutionMethod::TunnelEndpoint, tunnel_endpoint),
    (ResolutionMethod::CountryCenter, country_center),
];

/// Tier 1: the city configured on the site.
#[must_use]
pub fn configured_city(site: &Site, context: &ResolveContext<'_>) -> Option<Coordinate> {
    let city = site.city.as_deref()?;
    context.index.lookup_by_city(city, site.country.as_str())
}

/// Tier 2: the city estimated from the site name, when it is in the city table.
#[must_use]
pub fn llm_city(site: &Site, context: &ResolveContext<'_>) -> Option<Coordinate> {
    let city = context.estimates?.get(&site.id)?.city.as_deref()?;
    context.index.lookup_by_city(city, site.country.as_str())
}

/// Tier 3: the coordinate estimated for a city missing from the city table.
#[must_use]
pub fn llm_coordinate(site: &Site, context: &ResolveContext<'_>) -> Option<Coordinate> {
    let estimate = context.estimates?.get(&site.id)?;
    let city = estimate.city.as_deref()?;
    if context.index.lookup_by_city(city, site.country.as_str()).is_some() {
        return None;
    }
    estimate.coordinate
}

/// Tier 4: the geolocated tunnel endpoint of a connected site.
#[must_use]
pub fn tunnel_endpoint(site: &Site, _context: &ResolveContext<'_>) -> Option<Coordinate> {
    if site.is_connected() {
        site.tunnel_endpoint
    } else {
        None
    }
}

/// Tier 5: the centroid of the site's country.
#[must_use]
pub fn country_center(site: &Site, context: &ResolveContext<'_>) -> Option<Coordinate> {
    context.index.lookup_by_country(&site.country)
}

/// Applies [`CHAIN`] to sites.
pub struct Resolver<'ctx> {
    context: ResolveContext<'ctx>,
}

impl<'ctx> Resolver<'ctx> {
    /// Resolver without enrichment results.
    #[must_use]
    pub fn new(index: &'ctx GeoIndex) -> Self {
        Self {
            context: ResolveContext {
                index,
                estimates: None,
            },
        }
    }

    /// Enable the estimate-based tiers.
    #[must_use]
    pub fn with_estimates(mut self, estimates: &'ctx Estimates) -> Self {
        self.context.estimates = Some(estimates);
        self
    }

    /// Outcome of the chain for one site, without modifying it.
    #[must_use]
    pub fn resolve(&self, site: &Site) -> (Option<Coordinate>, ResolutionMethod) {
        CHAIN
            .iter()
            .find_map(|(method, strategy)| {
                strategy(site, &self.context).map(|coordinate| (Some(coordinate), *method))
            })
            .unwrap_or((None, ResolutionMethod::Unresolved))
    }

    /// Resolve one site in place, overwriting any earlier result.
    pub fn apply(&self, site: &mut Site) {
        let (coordinate, method) = self.resolve(site);
        if coordinate.is_none() {
            debug!(site = %site.id, country = %site.country, "no tier produced a coordinate");
        }
        site.coordinate = coordinate;
        site.method = method;
    }

    /// Resolve every site in place.
    pub fn resolve_all(&self, sites: &mut [Site]) {
        for site in sites {
            self.apply(site);
        }
    }

    /// Sites the configured-city tier cannot place; these are the enrichment candidates.
    #[must_use]
    pub fn tier_one_misses<'sites>(&self, sites: &'sites [Site]) -> Vec<&'sites Site> {
        sites
            .iter()
            .filter(|site| configured_city(site, &self.context).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::Estimate;
    use crate::geo::{CityRow, CountryRow};
    use crate::model::{ConnectionStatus, CountryCode, SiteId};

    fn index() -> GeoIndex {
        let countries = [("US", 38.0, -97.0), ("FR", 46.0, 2.0)].map(|(code, lat, lon)| {
            CountryRow {
                code: code.into(),
                name: None,
                latitude: lat,
                longitude: lon,
            }
        });
        let cities = [CityRow {
            city: "Boise".into(),
            city_ascii: None,
            country: "United States".into(),
            iso2: Some("US".into()),
            latitude: 43.61,
            longitude: -116.20,
        }];
        GeoIndex::build(countries, cities).expect("country table")
    }

    fn site(id: &str, country: &str) -> Site {
        Site {
            id: SiteId(id.into()),
            name: format!("Site {id}"),
            country: CountryCode::parse(country).expect("valid"),
            city: None,
            tunnel_endpoint: None,
            endpoint_pop: None,
            status: ConnectionStatus::Disconnected,
            coordinate: None,
            method: ResolutionMethod::Unresolved,
        }
    }

    fn connected(mut site: Site, latitude: f64, longitude: f64) -> Site {
        site.status = ConnectionStatus::Connected;
        site.tunnel_endpoint = Coordinate::new(latitude, longitude);
        site
    }

    fn coordinate(latitude: f64, longitude: f64) -> Option<Coordinate> {
        Coordinate::new(latitude, longitude)
    }

    #[test]
    fn configured_city_resolves_first() {
        let index = index();
        let mut boise = site("1", "US");
        boise.city = Some("Boise".into());
        Resolver::new(&index).apply(&mut boise);
        assert_eq!(boise.method, ResolutionMethod::ConfiguredCity, "tier 1");
        assert_eq!(boise.coordinate, coordinate(43.61, -116.20), "city coordinate");
    }

    #[test]
    fn configured_city_beats_tunnel_endpoint() {
        let index = index();
        let mut both = connected(site("1", "US"), 40.7, -74.0);
        both.city = Some("boise".into());
        Resolver::new(&index).apply(&mut both);
        assert_eq!(both.method, ResolutionMethod::ConfiguredCity, "city wins over endpoint");
    }

    #[test]
    fn unknown_configured_city_falls_through_to_endpoint() {
        let index = index();
        let mut site = connected(site("1", "US"), 40.7, -74.0);
        site.city = Some("Springfield".into());
        Resolver::new(&index).apply(&mut site);
        assert_eq!(site.method, ResolutionMethod::TunnelEndpoint, "tier 4");
        assert_eq!(site.coordinate, coordinate(40.7, -74.0), "endpoint coordinate");
    }

    #[test]
    fn disconnected_site_uses_country_center() {
        let index = index();
        let mut site = site("1", "FR");
        Resolver::new(&index).apply(&mut site);
        assert_eq!(site.method, ResolutionMethod::CountryCenter, "tier 5");
        assert_eq!(site.coordinate, coordinate(46.0, 2.0), "country centroid");
    }

    #[test]
    fn endpoint_of_disconnected_site_is_ignored() {
        let index = index();
        let mut site = site("1", "US");
        site.tunnel_endpoint = coordinate(40.7, -74.0);
        Resolver::new(&index).apply(&mut site);
        assert_eq!(site.method, ResolutionMethod::CountryCenter, "stale endpoint skipped");
    }

    #[test]
    fn unknown_country_is_unresolved() {
        let index = index();
        let mut site = site("1", "DE");
        Resolver::new(&index).apply(&mut site);
        assert_eq!(site.method, ResolutionMethod::Unresolved, "no tier matched");
        assert!(site.coordinate.is_none(), "no coordinate");
    }

    #[test]
    fn resolution_is_idempotent() {
        let index = index();
        let resolver = Resolver::new(&index);
        let mut sites = vec![
            connected(site("1", "US"), 40.7, -74.0),
            site("2", "FR"),
            site("3", "DE"),
        ];
        resolver.resolve_all(&mut sites);
        let first = sites.clone();
        resolver.resolve_all(&mut sites);
        assert_eq!(first, sites, "second pass changes nothing");
    }

    #[test]
    fn estimated_city_in_table_uses_llm_city() {
        let index = index();
        let mut estimates = Estimates::default();
        estimates.insert(
            SiteId("1".into()),
            Estimate {
                city: Some("Boise".into()),
                coordinate: None,
            },
        );
        let mut site = connected(site("1", "US"), 40.7, -74.0);
        Resolver::new(&index).with_estimates(&estimates).apply(&mut site);
        assert_eq!(site.method, ResolutionMethod::LlmCity, "tier 2 beats the endpoint");
        assert_eq!(site.coordinate, coordinate(43.61, -116.20), "table coordinate");
    }

    #[test]
    fn estimated_city_outside_table_uses_llm_coordinate() {
        let index = index();
        let mut estimates = Estimates::default();
        estimates.insert(
            SiteId("1".into()),
            Estimate {
                city: Some("Nampa".into()),
                coordinate: coordinate(43.54, -116.56),
            },
        );
        let mut site = site("1", "US");
        Resolver::new(&index).with_estimates(&estimates).apply(&mut site);
        assert_eq!(site.method, ResolutionMethod::LlmCoordinate, "tier 3");
        assert_eq!(site.coordinate, coordinate(43.54, -116.56), "estimated coordinate");
    }

    #[test]
    fn estimate_without_city_is_not_used() {
        let index = index();
        let mut estimates = Estimates::default();
        estimates.insert(
            SiteId("1".into()),
            Estimate {
                city: None,
                coordinate: coordinate(43.54, -116.56),
            },
        );
        let mut site = site("1", "US");
        Resolver::new(&index).with_estimates(&estimates).apply(&mut site);
        assert_eq!(site.method, ResolutionMethod::CountryCenter, "tier 3 needs a city");
    }

    #[test]
    fn estimates_are_ignored_without_enrichment() {
        let index = index();
        let mut estimates = Estimates::default();
        estimates.insert(
            SiteId("1".into()),
            Estimate {
                city: Some("Boise".into()),
                coordinate: None,
            },
        );
        let mut site = site("1", "US");
        let enabled = Resolver::new(&index).with_estimates(&estimates).resolve(&site);
        Resolver::new(&index).apply(&mut site);
        assert_eq!(enabled.1, ResolutionMethod::LlmCity, "enabled resolver uses the estimate");
        assert_eq!(site.method, ResolutionMethod::CountryCenter, "disabled resolver skips it");
    }

    #[test]
    fn tier_one_misses_exclude_placed_sites() {
        let index = index();
        let mut placed = site("1", "US");
        placed.city = Some("Boise".into());
        let mut unknown_city = site("2", "US");
        unknown_city.city = Some("Atlantis".into());
        let sites = vec![placed, unknown_city, site("3", "FR")];
        let misses: Vec<&str> = Resolver::new(&index)
            .tier_one_misses(&sites)
            .into_iter()
            .map(|site| site.id.0.as_str())
            .collect();
        assert_eq!(misses, ["2", "3"], "only unplaced sites are enrichment candidates");
    }
}
