//! Assignment of connected sites to POPs.

use tracing::debug;

use crate::geo::haversine_km;
use crate::model::{Connection, Coordinate, MatchMethod, Pop, Site, SiteId};

#[derive(Debug, Clone, Default, PartialEq)]
/// Connections for all placeable connected sites, plus the ones that could not be placed.
pub struct MatchOutcome {
    /// One connection per matched site, in site order.
    pub connections: Vec<Connection>,
    /// Connected sites without a coordinate, or with no POP to connect to.
    pub unmatched: Vec<SiteId>,
}

/// Matches sites against an immutable POP set.
pub struct Matcher<'pops> {
    pops: &'pops [Pop],
}

impl<'pops> Matcher<'pops> {
    /// Create a matcher over `pops`.
    #[must_use]
    pub fn new(pops: &'pops [Pop]) -> Self {
        Self { pops }
    }

    /// POP named by a tunnel's metadata, matched on identifier first, then on name.
    #[must_use]
    pub fn endpoint_pop(&self, reference: &str) -> Option<&'pops Pop> {
        let reference = reference.trim();
        self.pops
            .iter()
            .find(|pop| pop.id.0 == reference)
            .or_else(|| self.pops.iter().find(|pop| pop.name == reference))
    }

    /// Closest POP to `at`; equal distances go to the smaller identifier.
    #[must_use]
    pub fn nearest(&self, at: Coordinate) -> Option<(&'pops Pop, f64)> {
        self.pops
            .iter()
            .map(|pop| (pop, haversine_km(at, pop.coordinate)))
            .min_by(|(left_pop, left_km), (right_pop, right_km)| {
                left_km
                    .total_cmp(right_km)
                    .then_with(|| left_pop.id.cmp(&right_pop.id))
            })
    }

    /// Connection for one site; `None` for disconnected or unplaceable sites.
    ///
    /// Every connection carries a measured distance, so a site without a coordinate stays
    /// unmatched even when its tunnel names a known POP.
    #[must_use]
    pub fn connect(&self, site: &Site) -> Option<Connection> {
        if !site.is_connected() {
            return None;
        }
        let at = site.coordinate?;

        if let Some(pop) = site.endpoint_pop.as_deref().and_then(|name| self.endpoint_pop(name)) {
            return Some(Connection {
                site: site.id.clone(),
                pop: pop.id.clone(),
                distance_km: haversine_km(at, pop.coordinate),
                method: MatchMethod::EndpointIdentity,
            });
        }
        if let Some(reference) = site.endpoint_pop.as_deref() {
            debug!(site = %site.id, pop = reference, "endpoint POP unknown, matching by distance");
        }

        let (pop, distance_km) = self.nearest(at)?;
        Some(Connection {
            site: site.id.clone(),
            pop: pop.id.clone(),
            distance_km,
            method: MatchMethod::NearestDistance,
        })
    }

    /// Connections for every connected site.
    #[must_use]
    pub fn connect_all(&self, sites: &[Site]) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        for site in sites.iter().filter(|site| site.is_connected()) {
            match self.connect(site) {
                Some(connection) => outcome.connections.push(connection),
                None => outcome.unmatched.push(site.id.clone()),
            }
        }
        outcome
    }
}

/// Copy of `pops` with each POP's connected site set filled from `connections`.
#[must_use]
pub fn attach_connections(pops: &[Pop], connections: &[Connection]) -> Vec<Pop> {
    let mut attached = pops.to_vec();
    for connection in connections {
        if let Some(pop) = attached.iter_mut().find(|pop| pop.id == connection.pop) {
            pop.connected_sites.insert(connection.site.clone());
        }
    }
    attached
}
