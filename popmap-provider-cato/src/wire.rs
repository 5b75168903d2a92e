//! Serde mirrors of the Cato GraphQL responses and their mapping to raw records.

use serde::{Deserialize, Deserializer};

use popmap_core::ports::{RawPop, RawSite};

/// POP names whose derived key is not the city's table name.
const CITY_FIXUPS: [(&str, &str); 7] = [
    ("beijingct", "beijing"),
    ("shanghaict", "shanghai"),
    ("shenzhenct", "shenzhen"),
    ("kansas-city", "kansas city"),
    ("ho chi minh", "ho chi minh city"),
    ("tel aviv", "tel aviv-yafo"),
    ("hong kong equinix", "hong kong"),
];

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub(crate) data: Option<T>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    #[serde(default)]
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SnapshotData {
    pub(crate) account_snapshot: AccountSnapshot,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) sites: Vec<SiteEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SiteEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    connectivity_status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    info: SiteInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    devices: Vec<Device>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteInfo {
    name: Option<String>,
    country_code: Option<String>,
    // Not part of the live query; hand-written snapshots may carry it.
    city_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Device {
    #[serde(default, deserialize_with = "null_as_default")]
    interfaces: Vec<Interface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Interface {
    #[serde(default, rename = "tunnelRemoteIPInfo")]
    tunnel_remote_ip_info: Option<IpInfo>,
    #[serde(default)]
    pop_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpInfo {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PopData {
    pub(crate) pop_locations: PopLocations,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PopLocations {
    pub(crate) pop_location_list: PopLocationList,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PopLocationList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) items: Vec<PopEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PopEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    country: Option<PopCountry>,
}

#[derive(Debug, Deserialize)]
struct PopCountry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// The API sends `null` for empty lists and objects as often as it omits them.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<SiteEntry> for RawSite {
    fn from(entry: SiteEntry) -> Self {
        // Only the first interface of the first device describes the active tunnel.
        let interface = entry
            .devices
            .into_iter()
            .next()
            .and_then(|device| device.interfaces.into_iter().next());
        let (endpoint, pop_name) = match interface {
            Some(interface) => (interface.tunnel_remote_ip_info, interface.pop_name),
            None => (None, None),
        };

        Self {
            id: entry.id,
            name: entry.info.name,
            country_code: entry.info.country_code,
            city: entry.info.city_name,
            connectivity: entry.connectivity_status,
            endpoint_latitude: endpoint.as_ref().and_then(|info| info.latitude),
            endpoint_longitude: endpoint.as_ref().and_then(|info| info.longitude),
            pop_name,
        }
    }
}

impl From<PopEntry> for RawPop {
    fn from(entry: PopEntry) -> Self {
        Self {
            city: entry.name.as_deref().map(pop_city_key),
            id: entry.id,
            name: entry.name,
            country: entry.country.as_ref().and_then(|country| country.name.clone()),
            country_code: entry.country.and_then(|country| country.id),
            latitude: None,
            longitude: None,
        }
    }
}

/// City key encoded in a POP name, e.g. `"Frankfurt2"` → `"frankfurt"`.
#[must_use]
pub fn pop_city_key(pop_name: &str) -> String {
    let mut lowered = pop_name
        .chars()
        .filter(|character| !character.is_ascii_digit())
        .collect::<String>()
        .to_lowercase();
    if let Some(cut) = lowered.find("_aws") {
        lowered.truncate(cut);
    }
    let key = lowered.trim();
    CITY_FIXUPS
        .iter()
        .find(|(from, _)| *from == key)
        .map_or_else(|| key.to_owned(), |(_, to)| (*to).to_owned())
}
