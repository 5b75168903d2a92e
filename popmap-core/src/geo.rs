//! In-memory country and city coordinate tables, and great-circle distance.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::debug;

use crate::error::EngineError;
use crate::model::{Coordinate, CountryCode};

/// Mean Earth radius used for all distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, PartialEq)]
/// One row of the country centroid table.
pub struct CountryRow {
    /// Two-letter country code.
    pub code: String,
    /// English country name, when the table carries one.
    pub name: Option<String>,
    /// Centroid latitude.
    pub latitude: f64,
    /// Centroid longitude.
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
/// One row of the city table.
pub struct CityRow {
    /// City name as displayed.
    pub city: String,
    /// ASCII transliteration of the name, if different.
    pub city_ascii: Option<String>,
    /// Country name.
    pub country: String,
    /// Two-letter code of the country.
    pub iso2: Option<String>,
    /// City latitude.
    pub latitude: f64,
    /// City longitude.
    pub longitude: f64,
}

/// Read-only lookup tables built once per run.
#[derive(Debug, Default)]
pub struct GeoIndex {
    countries: HashMap<CountryCode, Coordinate>,
    country_names: HashMap<String, CountryCode>,
    // Country spellings and codes as the city table writes them.
    city_countries: HashMap<String, CountryCode>,
    cities: HashMap<(String, String), Coordinate>,
}

impl GeoIndex {
    /// Index every row of the two tables.
    ///
    /// Rows with an unusable code or coordinate are skipped. For duplicate keys the first row
    /// wins, so tables sorted by importance keep their most relevant entry.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingCountryTable`] when no country row is usable, since the
    /// final fallback tier would then be impossible for every site.
    pub fn build<C, T>(countries: C, cities: T) -> Result<Self, EngineError>
    where
        C: IntoIterator<Item = CountryRow>,
        T: IntoIterator<Item = CityRow>,
    {
        let mut index = Self::default();
        let mut skipped = 0_usize;

        for row in countries {
            let (Ok(code), Some(coordinate)) = (
                CountryCode::parse(&row.code),
                Coordinate::new(row.latitude, row.longitude),
            ) else {
                skipped += 1;
                continue;
            };
            if let Some(name) = row.name.as_deref().map(normalize).filter(|key| !key.is_empty()) {
                index.country_names.entry(name).or_insert_with(|| code.clone());
            }
            index.countries.entry(code).or_insert(coordinate);
        }

        if index.countries.is_empty() {
            return Err(EngineError::MissingCountryTable);
        }

        for row in cities {
            let Some(coordinate) = Coordinate::new(row.latitude, row.longitude) else {
                skipped += 1;
                continue;
            };
            if let Some(code) = row.iso2.as_deref().and_then(|iso2| CountryCode::parse(iso2).ok()) {
                for key in [normalize(&row.country), normalize(code.as_str())] {
                    if !key.is_empty() {
                        index.city_countries.entry(key).or_insert_with(|| code.clone());
                    }
                }
            }
            let names = [Some(row.city.as_str()), row.city_ascii.as_deref()];
            let country_keys = [Some(row.country.as_str()), row.iso2.as_deref()];
            for name in names.into_iter().flatten().map(normalize) {
                for country in country_keys.into_iter().flatten().map(normalize) {
                    if name.is_empty() || country.is_empty() {
                        continue;
                    }
                    if let Entry::Vacant(slot) = index.cities.entry((name.clone(), country)) {
                        slot.insert(coordinate);
                    }
                }
            }
        }

        debug!(
            countries = index.countries.len(),
            city_keys = index.cities.len(),
            skipped,
            "geo index built"
        );
        Ok(index)
    }

    /// Centroid of a country.
    #[must_use]
    pub fn lookup_by_country(&self, code: &CountryCode) -> Option<Coordinate> {
        self.countries.get(code).copied()
    }

    /// Coordinate of a city, matched case-insensitively on city and country.
    ///
    /// `country` may be a country name or a two-letter code.
    #[must_use]
    pub fn lookup_by_city(&self, city: &str, country: &str) -> Option<Coordinate> {
        self.cities.get(&(normalize(city), normalize(country))).copied()
    }

    /// Map a country name or code onto a known code.
    ///
    /// The country table is consulted first. Names it spells differently, and codes it lacks,
    /// are then looked up among the city table's country columns.
    #[must_use]
    pub fn country_code(&self, name_or_code: &str) -> Option<CountryCode> {
        if let Ok(code) = CountryCode::parse(name_or_code)
            && self.countries.contains_key(&code)
        {
            return Some(code);
        }
        let key = normalize(name_or_code);
        self.country_names
            .get(&key)
            .or_else(|| self.city_countries.get(&key))
            .cloned()
    }

    /// Number of indexed countries.
    #[must_use]
    pub fn country_count(&self) -> usize {
        self.countries.len()
    }

    /// Number of indexed (city, country) keys.
    #[must_use]
    pub fn city_key_count(&self) -> usize {
        self.cities.len()
    }
}

/// Lower-case, trimmed form used for every textual key.
pub(crate) fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Great-circle distance between two coordinates in kilometers (haversine).
#[must_use]
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let from_lat = from.latitude.to_radians();
    let to_lat = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let half_chord = (delta_lat / 2.0).sin().powi(2)
        + from_lat.cos() * to_lat.cos() * (delta_lon / 2.0).sin().powi(2);
    let central_angle = 2.0 * half_chord.clamp(0.0, 1.0).sqrt().asin();

    (EARTH_RADIUS_KM * central_angle).max(0.0)
}
