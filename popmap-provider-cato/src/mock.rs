//! Inventory backed by saved API responses.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::info;

use popmap_core::{
    model::SourceMeta,
    ports::{InventoryPort, PortError, RawPop, RawSite},
};

use crate::unwrap_envelope;
use crate::wire::{Envelope, PopData, SnapshotData};

/// File holding a saved `accountSnapshot` response.
pub const SNAPSHOT_FILE: &str = "mock_accountSnapshot.json";
/// File holding a saved `popLocationList` response.
pub const POP_FILE: &str = "mock_popLocationList.json";

/// Serves sites and POPs decoded once from two JSON files.
pub struct MockInventoryPort {
    meta: SourceMeta,
    sites: Vec<RawSite>,
    pops: Vec<RawPop>,
}

impl MockInventoryPort {
    /// Load both mock files from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Io`] if a file is missing, [`PortError::Decode`] if it is not valid
    /// JSON of the expected shape, and [`PortError::Api`] if it is a saved error response.
    pub fn from_dir(dir: &Path) -> Result<Self, PortError> {
        let snapshot: SnapshotData = load(&dir.join(SNAPSHOT_FILE), "accountSnapshot")?;
        let pops: PopData = load(&dir.join(POP_FILE), "popLocationList")?;
        let port = Self::from_data(snapshot, pops, dir);
        info!(
            dir = %dir.display(),
            sites = port.sites.len(),
            pops = port.pops.len(),
            "loaded mock inventory"
        );
        Ok(port)
    }

    fn from_data(snapshot: SnapshotData, pops: PopData, dir: &Path) -> Self {
        Self {
            meta: SourceMeta {
                id: format!("mock:{}", dir.display()),
                name: String::from("Cato Networks (mock)"),
            },
            sites: snapshot
                .account_snapshot
                .sites
                .into_iter()
                .map(RawSite::from)
                .collect(),
            pops: pops
                .pop_locations
                .pop_location_list
                .items
                .into_iter()
                .map(RawPop::from)
                .collect(),
        }
    }
}

#[async_trait]
impl InventoryPort for MockInventoryPort {
    fn source(&self) -> &SourceMeta {
        &self.meta
    }

    async fn sites(&self) -> Result<Vec<RawSite>, PortError> {
        Ok(self.sites.clone())
    }

    async fn pops(&self) -> Result<Vec<RawPop>, PortError> {
        Ok(self.pops.clone())
    }
}

fn load<T: DeserializeOwned>(path: &Path, operation: &str) -> Result<T, PortError> {
    let text = fs::read_to_string(path)?;
    let envelope: Envelope<T> = serde_json::from_str(&text)?;
    unwrap_envelope(operation, envelope)
}
