//! Error types for model construction, enrichment, and the pipeline itself.

use crate::ports::PortError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Reasons a raw record is rejected by the model builder.
pub enum ModelError {
    /// Country code is missing or cannot name a real country.
    #[error("Invalid country code: {0:?}")]
    InvalidCountryCode(String),
    /// POP country could not be mapped to a known country.
    #[error("Unknown country: {0:?}")]
    UnknownCountry(String),
    /// A required field is absent.
    #[error("Record {record} is missing `{field}`")]
    MissingField {
        /// Best available description of the record.
        record: String,
        /// Name of the missing field.
        field: &'static str,
    },
    /// Another record already claimed this identifier.
    #[error("Duplicate identifier: {0}")]
    DuplicateId(String),
    /// POP has no coordinate and its city is not in the city table.
    #[error("Unknown POP location {city:?} in {country}")]
    UnknownPopLocation {
        /// City derived for the POP.
        city: String,
        /// Country the city was looked up in.
        country: String,
    },
}

#[derive(thiserror::Error, Debug)]
/// Recoverable failures of the estimation collaborator.
pub enum EnrichmentError {
    /// The whole call failed; every site in the batch falls through.
    #[error("Estimation batch {batch} failed: {source}")]
    BatchFailure {
        /// Zero-based batch number in submission order.
        batch: usize,
        /// Underlying collaborator error.
        #[source]
        source: PortError,
    },
    /// One entry of an otherwise usable response was missing or invalid.
    #[error("Malformed estimate for site {site}: {reason}")]
    EntryMalformed {
        /// Site the entry belongs to, or a placeholder if the id itself was missing.
        site: String,
        /// What was wrong with the entry.
        reason: &'static str,
    },
}

#[derive(thiserror::Error, Debug)]
/// Structural failures that abort a run before any site is resolved.
pub enum EngineError {
    /// The country table produced no usable rows.
    #[error("Country table is missing or empty")]
    MissingCountryTable,
    /// The inventory collaborator could not deliver sites or POPs.
    #[error("Inventory error: {0}")]
    Inventory(#[from] PortError),
}
