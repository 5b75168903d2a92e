//! Domain data structures for sites, POPs, and the derived topology.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrichment::EnrichmentReport;
use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Latitude/longitude pair in decimal degrees.
pub struct Coordinate {
    /// Latitude in degrees, `-90..=90`.
    pub latitude: f64,
    /// Longitude in degrees, `-180..=180`.
    pub longitude: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// Upper-case ISO 3166-1 alpha-2 country code.
pub struct CountryCode(String);

impl CountryCode {
    /// Parse and normalize a two-letter country code.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidCountryCode`] for empty input, anything that is not two ASCII
    /// letters, and the user-assigned ranges (`AA`, `QM`-`QZ`, `XA`-`XZ` except `XK`, `ZZ`)
    /// which never name a real country.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let code = raw.trim().to_ascii_uppercase();
        let well_formed = code.len() == 2 && code.bytes().all(|byte| byte.is_ascii_uppercase());
        if !well_formed || is_user_assigned(&code) {
            return Err(ModelError::InvalidCountryCode(raw.to_owned()));
        }
        Ok(Self(code))
    }

    /// The normalized code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_user_assigned(code: &str) -> bool {
    match code.as_bytes() {
        [b'A', b'A'] | [b'Z', b'Z'] => true,
        [b'Q', second] => (b'M'..=b'Z').contains(second),
        [b'X', second] => *second != b'K',
        _ => false,
    }
}

impl TryFrom<String> for CountryCode {
    type Error = ModelError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifier of a customer site.
pub struct SiteId(pub String);

impl fmt::Display for SiteId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier of a point of presence.
///
/// Ordering is numeric when both identifiers are numeric, lexicographic otherwise; numeric
/// identifiers sort before non-numeric ones.
pub struct PopId(pub String);

impl Ord for PopId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(left), Ok(right)) => left.cmp(&right).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for PopId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PopId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata describing a collaborator feeding the engine.
pub struct SourceMeta {
    /// Short machine-friendly identifier.
    pub id: String,
    /// Human-friendly description used in logs.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Whether a site currently has an active tunnel.
pub enum ConnectionStatus {
    /// Tunnel is up.
    Connected,
    /// Tunnel is down or the site never connected.
    Disconnected,
}

impl ConnectionStatus {
    /// Interpret a vendor status string; anything other than `connected` is disconnected.
    #[must_use]
    pub fn from_vendor(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("connected") {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Tier of the resolution chain that produced a site's coordinate.
pub enum ResolutionMethod {
    /// City configured on the site, found in the city table.
    ConfiguredCity,
    /// City estimated from the site name, found in the city table.
    LlmCity,
    /// Coordinate estimated directly for a city missing from the city table.
    LlmCoordinate,
    /// Geolocation of the active tunnel's remote endpoint.
    TunnelEndpoint,
    /// Centroid of the site's country.
    CountryCenter,
    /// No tier produced a coordinate.
    Unresolved,
}

impl ResolutionMethod {
    /// Every method in chain order.
    pub const ALL: [Self; 6] = [
        Self::ConfiguredCity,
        Self::LlmCity,
        Self::LlmCoordinate,
        Self::TunnelEndpoint,
        Self::CountryCenter,
        Self::Unresolved,
    ];

    /// The kebab-case tag used in output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfiguredCity => "configured-city",
            Self::LlmCity => "llm-city",
            Self::LlmCoordinate => "llm-coordinate",
            Self::TunnelEndpoint => "tunnel-endpoint",
            Self::CountryCenter => "country-center",
            Self::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Customer site after validation.
pub struct Site {
    /// Unique identifier.
    pub id: SiteId,
    /// Display name, also the input for name-based estimation.
    pub name: String,
    /// Country the site is registered in.
    pub country: CountryCode,
    /// City configured on the site, if any.
    pub city: Option<String>,
    /// Geolocated remote address of the site's tunnel.
    pub tunnel_endpoint: Option<Coordinate>,
    /// POP the tunnel terminates on, as reported by the vendor.
    pub endpoint_pop: Option<String>,
    /// Connectivity at snapshot time.
    pub status: ConnectionStatus,
    /// Resolved position; `None` until resolved or when unresolvable.
    pub coordinate: Option<Coordinate>,
    /// Tier that produced `coordinate`.
    pub method: ResolutionMethod,
}

impl Site {
    /// Whether the site has an active tunnel.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Provider point of presence.
pub struct Pop {
    /// Unique identifier.
    pub id: PopId,
    /// Display name.
    pub name: String,
    /// Country hosting the POP.
    pub country: CountryCode,
    /// City hosting the POP, when known.
    pub city: Option<String>,
    /// Position; POPs are never run through the resolution chain.
    pub coordinate: Coordinate,
    /// Sites connected to this POP, filled in when the topology is assembled.
    #[serde(default)]
    pub connected_sites: BTreeSet<SiteId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// How a connection's POP was chosen.
pub enum MatchMethod {
    /// The tunnel metadata named the POP.
    EndpointIdentity,
    /// Closest POP by great-circle distance.
    NearestDistance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Link between a connected site and its POP.
pub struct Connection {
    /// Connected site.
    pub site: SiteId,
    /// POP serving the site.
    pub pop: PopId,
    /// Great-circle distance between the two, in kilometers.
    pub distance_km: f64,
    /// How the POP was chosen.
    pub method: MatchMethod,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Counters describing a finished topology.
pub struct TopologySummary {
    /// Sites accepted by the model builder.
    pub sites: usize,
    /// Sites with an active tunnel.
    pub connected: usize,
    /// Sites without an active tunnel.
    pub disconnected: usize,
    /// POPs accepted by the model builder.
    pub pops: usize,
    /// POPs with no connected site.
    pub empty_pops: usize,
    /// Connections derived by the matcher.
    pub connections: usize,
    /// Site records rejected during model construction.
    pub rejected_sites: usize,
    /// POP records rejected during model construction.
    pub rejected_pops: usize,
    /// Sites per resolution method.
    pub methods: BTreeMap<ResolutionMethod, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Resolved sites, POPs, and their connections, handed to the rendering layer.
pub struct Topology {
    /// When the topology was assembled.
    pub generated_at: DateTime<Utc>,
    /// Inventory the sites and POPs came from.
    pub source: SourceMeta,
    /// Every accepted site with its coordinate and method tag.
    pub sites: Vec<Site>,
    /// Every accepted POP with its connected site set.
    pub pops: Vec<Pop>,
    /// One connection per placeable connected site.
    pub connections: Vec<Connection>,
    /// Connected sites that could not be matched to a POP.
    pub unmatched: Vec<SiteId>,
    /// Counters for reporting.
    pub summary: TopologySummary,
    /// Enrichment statistics, present when enrichment ran.
    pub enrichment: Option<EnrichmentReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_code_is_normalized() {
        let code = CountryCode::parse(" us ").expect("valid code");
        assert_eq!(code.as_str(), "US", "code should be trimmed and upper-cased");
    }

    #[test]
    fn country_code_rejects_malformed_and_reserved_values() {
        for raw in ["", "USA", "1A", "ZZ", "XA", "QM", "AA"] {
            assert!(
                matches!(CountryCode::parse(raw), Err(ModelError::InvalidCountryCode(_))),
                "{raw:?} should be rejected"
            );
        }
        assert!(CountryCode::parse("XK").is_ok(), "Kosovo is accepted");
    }

    #[test]
    fn country_code_deserializes_through_validation() {
        let parsed: Result<CountryCode, _> = serde_json::from_str("\"ZZ\"");
        assert!(parsed.is_err(), "reserved code must not deserialize");
    }

    #[test]
    fn pop_ids_order_numerically_then_lexicographically() {
        let mut ids = vec![
            PopId("fra".into()),
            PopId("12".into()),
            PopId("ams".into()),
            PopId("7".into()),
        ];
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(|id| id.0.as_str()).collect();
        assert_eq!(ordered, ["7", "12", "ams", "fra"], "unexpected ordering");
    }

    #[test]
    fn coordinate_rejects_out_of_range_values() {
        assert!(Coordinate::new(91.0, 0.0).is_none(), "latitude above 90");
        assert!(Coordinate::new(0.0, -180.5).is_none(), "longitude below -180");
        assert!(Coordinate::new(f64::NAN, 0.0).is_none(), "NaN latitude");
        assert!(Coordinate::new(43.61, -116.2).is_some(), "Boise is valid");
    }

    #[test]
    fn vendor_status_is_case_insensitive() {
        assert_eq!(
            ConnectionStatus::from_vendor("Connected"),
            ConnectionStatus::Connected,
            "capitalized status"
        );
        assert_eq!(
            ConnectionStatus::from_vendor("disconnected"),
            ConnectionStatus::Disconnected,
            "explicit disconnect"
        );
        assert_eq!(
            ConnectionStatus::from_vendor(""),
            ConnectionStatus::Disconnected,
            "missing status"
        );
    }

    #[test]
    fn method_tags_serialize_kebab_case() {
        let json = serde_json::to_string(&ResolutionMethod::LlmCoordinate).expect("serialize");
        assert_eq!(json, "\"llm-coordinate\"", "tag should be kebab-case");
        for method in ResolutionMethod::ALL {
            let json = serde_json::to_string(&method).expect("serialize");
            assert_eq!(json, format!("\"{method}\""), "Display and serde must agree");
        }
    }
}
