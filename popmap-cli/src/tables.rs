//! CSV loading for the country centroid and city tables.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use popmap_core::geo::{CityRow, CountryRow};
use serde::Deserialize;
use tracing::{debug, warn};

// Some published copies quote fields after a leading space, which leaves the quotes in the value.
#[derive(Debug, Deserialize)]
struct CountryRecord {
    #[serde(rename = "Country")]
    name: String,
    #[serde(rename = "Alpha-2 code")]
    code: String,
    #[serde(rename = "Latitude (average)")]
    latitude: String,
    #[serde(rename = "Longitude (average)")]
    longitude: String,
}

#[derive(Debug, Deserialize)]
struct CityRecord {
    city: String,
    #[serde(default)]
    city_ascii: Option<String>,
    lat: f64,
    lng: f64,
    country: String,
    #[serde(default)]
    iso2: Option<String>,
}

/// Load the country table (`Country`, `Alpha-2 code`, `Latitude (average)`, ...).
pub(crate) fn load_countries(path: &Path) -> Result<Vec<CountryRow>> {
    let file = File::open(path)
        .with_context(|| format!("cannot open country table {}", path.display()))?;
    let rows = read_countries(file)
        .with_context(|| format!("cannot read country table {}", path.display()))?;
    debug!(path = %path.display(), rows = rows.len(), "country table loaded");
    Ok(rows)
}

/// Load the city table (`city`, `city_ascii`, `lat`, `lng`, `country`, `iso2`, ...).
pub(crate) fn load_cities(path: &Path) -> Result<Vec<CityRow>> {
    let file =
        File::open(path).with_context(|| format!("cannot open city table {}", path.display()))?;
    let rows =
        read_cities(file).with_context(|| format!("cannot read city table {}", path.display()))?;
    debug!(path = %path.display(), rows = rows.len(), "city table loaded");
    Ok(rows)
}

fn read_countries<R: Read>(reader: R) -> Result<Vec<CountryRow>> {
    let mut table = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    let mut skipped = 0_usize;
    for record in table.deserialize::<CountryRecord>() {
        let record = record?;
        let (Ok(latitude), Ok(longitude)) = (
            unquote(&record.latitude).parse::<f64>(),
            unquote(&record.longitude).parse::<f64>(),
        ) else {
            skipped += 1;
            continue;
        };
        rows.push(CountryRow {
            code: unquote(&record.code).to_owned(),
            name: Some(unquote(&record.name).to_owned()),
            latitude,
            longitude,
        });
    }
    if skipped > 0 {
        warn!(skipped, "country rows without numeric coordinates skipped");
    }
    Ok(rows)
}

fn read_cities<R: Read>(reader: R) -> Result<Vec<CityRow>> {
    let mut table = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    let mut skipped = 0_usize;
    for record in table.deserialize::<CityRecord>() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        rows.push(CityRow {
            city: record.city,
            city_ascii: record.city_ascii.filter(|ascii| !ascii.is_empty()),
            country: record.country,
            iso2: record.iso2.filter(|iso2| !iso2.is_empty()),
            latitude: record.lat,
            longitude: record.lng,
        });
    }
    if skipped > 0 {
        warn!(skipped, "unreadable city rows skipped");
    }
    Ok(rows)
}

fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}
