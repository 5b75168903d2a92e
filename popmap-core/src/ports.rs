//! Traits describing the collaborators feeding the engine and the raw records they return.

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;

use crate::model::{CountryCode, SiteId, SourceMeta};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to collaborators.
pub enum PortError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] JsonError),
    /// Local file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Remote side rejected the request.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status, or 200 for GraphQL-level errors.
        status: u16,
        /// Error text returned by the remote side.
        message: String,
    },
    /// Response decoded but lacks the expected structure.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Site record as delivered by an inventory, before validation.
pub struct RawSite {
    /// Vendor identifier.
    pub id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Two-letter country code.
    pub country_code: Option<String>,
    /// Configured city.
    pub city: Option<String>,
    /// Vendor connectivity string, e.g. `"Connected"`.
    pub connectivity: Option<String>,
    /// Latitude of the tunnel's remote endpoint.
    pub endpoint_latitude: Option<f64>,
    /// Longitude of the tunnel's remote endpoint.
    pub endpoint_longitude: Option<f64>,
    /// POP the tunnel terminates on.
    pub pop_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// POP record as delivered by an inventory, before validation.
pub struct RawPop {
    /// Vendor identifier.
    pub id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Country name or code.
    pub country: Option<String>,
    /// Two-letter country code, when the vendor supplies one next to the name.
    pub country_code: Option<String>,
    /// City hosting the POP.
    pub city: Option<String>,
    /// Latitude, if the vendor supplies one.
    pub latitude: Option<f64>,
    /// Longitude, if the vendor supplies one.
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One site sent to the estimation collaborator.
pub struct EstimateRequest {
    /// Site the answer must be keyed by.
    pub site_id: SiteId,
    /// Free-text site name to estimate from.
    pub name: String,
    /// Country the site is registered in.
    pub country: CountryCode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// One entry of an estimation response. Nothing in it is trusted until validated.
pub struct RawEstimate {
    /// Site the entry claims to answer.
    #[serde(default, alias = "id")]
    pub site_id: Option<String>,
    /// Estimated city name.
    #[serde(default)]
    pub city: Option<String>,
    /// Estimated latitude.
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    /// Estimated longitude.
    #[serde(default, alias = "lon", alias = "lng")]
    pub longitude: Option<f64>,
}

#[async_trait]
/// Source of raw site and POP records.
pub trait InventoryPort: Send + Sync {
    /// Metadata describing this inventory.
    fn source(&self) -> &SourceMeta;

    /// Fetch every site record of the account.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the inventory cannot be read.
    async fn sites(&self) -> Result<Vec<RawSite>, PortError>;

    /// Fetch every POP record available to the account.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the POP list cannot be read.
    async fn pops(&self) -> Result<Vec<RawPop>, PortError>;
}

#[async_trait]
/// Text-estimation collaborator inferring locations from site names.
pub trait EstimatorPort: Send + Sync {
    /// Metadata describing this estimator.
    fn source(&self) -> &SourceMeta;

    /// Estimate a city, and where useful a coordinate, for each request of one batch.
    ///
    /// Entries may be missing, duplicated, or malformed; callers validate them.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the batch as a whole fails.
    async fn estimate(&self, batch: &[EstimateRequest]) -> Result<Vec<RawEstimate>, PortError>;
}
