//! Validation of raw inventory records into canonical sites and POPs.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::error::ModelError;
use crate::geo::GeoIndex;
use crate::model::{
    ConnectionStatus, Coordinate, CountryCode, Pop, PopId, ResolutionMethod, Site, SiteId,
};
use crate::ports::{RawPop, RawSite};

#[derive(Debug, Clone, PartialEq)]
/// A raw record that did not make it into the model.
pub struct Rejection {
    /// Best available description of the record.
    pub record: String,
    /// Why it was rejected.
    pub error: ModelError,
}

#[derive(Debug, Clone, Default)]
/// Output of the model builder.
pub struct CanonicalModel {
    /// Validated sites, unresolved.
    pub sites: Vec<Site>,
    /// Validated POPs, each with a coordinate.
    pub pops: Vec<Pop>,
    /// Site records that failed validation.
    pub rejected_sites: Vec<Rejection>,
    /// POP records that failed validation.
    pub rejected_pops: Vec<Rejection>,
}

impl TryFrom<RawSite> for Site {
    type Error = ModelError;

    fn try_from(raw: RawSite) -> Result<Self, Self::Error> {
        let name = non_empty(raw.name.as_deref());
        let id = non_empty(raw.id.as_deref())
            .or_else(|| name.clone())
            .ok_or_else(|| ModelError::MissingField {
                record: describe(raw.id.as_deref(), raw.name.as_deref()),
                field: "id",
            })?;
        let country = CountryCode::parse(raw.country_code.as_deref().unwrap_or_default())?;

        let tunnel_endpoint = match (raw.endpoint_latitude, raw.endpoint_longitude) {
            (Some(latitude), Some(longitude)) => {
                let endpoint = Coordinate::new(latitude, longitude);
                if endpoint.is_none() {
                    debug!(site = %id, latitude, longitude, "ignoring invalid tunnel endpoint");
                }
                endpoint
            }
            _ => None,
        };

        Ok(Self {
            name: name.unwrap_or_else(|| id.clone()),
            id: SiteId(id),
            country,
            city: non_empty(raw.city.as_deref()),
            tunnel_endpoint,
            endpoint_pop: non_empty(raw.pop_name.as_deref()),
            status: ConnectionStatus::from_vendor(raw.connectivity.as_deref().unwrap_or_default()),
            coordinate: None,
            method: ResolutionMethod::Unresolved,
        })
    }
}

/// Turns raw collaborator records into the canonical model.
pub struct ModelBuilder<'index> {
    index: &'index GeoIndex,
}

impl<'index> ModelBuilder<'index> {
    /// Create a builder that resolves POP countries and cities against `index`.
    #[must_use]
    pub fn new(index: &'index GeoIndex) -> Self {
        Self { index }
    }

    /// Validate one POP record.
    ///
    /// A supplied coordinate is trusted; otherwise the POP's city is looked up in the index.
    /// The country is taken from the vendor's code when it has one, else from the name.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] when the identifier or country is missing or unknown, or when no
    /// coordinate can be established.
    pub fn pop(&self, raw: RawPop) -> Result<Pop, ModelError> {
        let name = non_empty(raw.name.as_deref());
        let record = describe(raw.id.as_deref(), raw.name.as_deref());
        let id = non_empty(raw.id.as_deref())
            .or_else(|| name.clone())
            .ok_or_else(|| ModelError::MissingField {
                record: record.clone(),
                field: "id",
            })?;
        let country_name = non_empty(raw.country.as_deref());
        let country_id = non_empty(raw.country_code.as_deref());
        let country_raw = country_name
            .clone()
            .or_else(|| country_id.clone())
            .ok_or(ModelError::MissingField {
                record,
                field: "country",
            })?;
        let country = [country_id.as_deref(), country_name.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|key| self.index.country_code(key))
            .ok_or_else(|| ModelError::UnknownCountry(country_raw.clone()))?;
        let city = non_empty(raw.city.as_deref());

        let given = raw
            .latitude
            .zip(raw.longitude)
            .and_then(|(latitude, longitude)| Coordinate::new(latitude, longitude));
        let coordinate = match (given, city.as_deref()) {
            (Some(coordinate), _) => coordinate,
            (None, Some(city_name)) => self
                .index
                .lookup_by_city(city_name, &country_raw)
                .or_else(|| self.index.lookup_by_city(city_name, country.as_str()))
                .ok_or_else(|| ModelError::UnknownPopLocation {
                    city: city_name.to_owned(),
                    country: country_raw.clone(),
                })?,
            (None, None) => {
                return Err(ModelError::MissingField {
                    record: id,
                    field: "city",
                });
            }
        };

        Ok(Pop {
            name: name.unwrap_or_else(|| id.clone()),
            id: PopId(id),
            country,
            city,
            coordinate,
            connected_sites: BTreeSet::new(),
        })
    }

    /// Validate every record, collecting rejections instead of failing the batch.
    #[must_use]
    pub fn build(&self, raw_sites: Vec<RawSite>, raw_pops: Vec<RawPop>) -> CanonicalModel {
        let mut model = CanonicalModel::default();

        let mut site_ids = HashSet::new();
        for raw in raw_sites {
            let record = describe(raw.id.as_deref(), raw.name.as_deref());
            match Site::try_from(raw) {
                Ok(site) if !site_ids.insert(site.id.clone()) => {
                    model.rejected_sites.push(Rejection {
                        record,
                        error: ModelError::DuplicateId(site.id.0),
                    });
                }
                Ok(site) => model.sites.push(site),
                Err(error) => model.rejected_sites.push(Rejection { record, error }),
            }
        }

        let mut pop_ids = HashSet::new();
        for raw in raw_pops {
            let record = describe(raw.id.as_deref(), raw.name.as_deref());
            match self.pop(raw) {
                Ok(pop) if !pop_ids.insert(pop.id.clone()) => {
                    model.rejected_pops.push(Rejection {
                        record,
                        error: ModelError::DuplicateId(pop.id.0),
                    });
                }
                Ok(pop) => model.pops.push(pop),
                Err(error) => model.rejected_pops.push(Rejection { record, error }),
            }
        }

        for rejection in &model.rejected_sites {
            warn!(record = %rejection.record, error = %rejection.error, "site rejected");
        }
        for rejection in &model.rejected_pops {
            warn!(record = %rejection.record, error = %rejection.error, "POP rejected");
        }

        model
    }
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn describe(id: Option<&str>, name: Option<&str>) -> String {
    match (non_empty(id), non_empty(name)) {
        (Some(id), Some(name)) => format!("{id} ({name})"),
        (Some(label), None) | (None, Some(label)) => label,
        (None, None) => "<unnamed>".to_owned(),
    }
}
