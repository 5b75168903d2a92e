//! Inventory provider for Cato Networks accounts using the GraphQL API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use popmap_core::{
    model::SourceMeta,
    ports::{InventoryPort, PortError, RawPop, RawSite},
};

use crate::wire::{Envelope, PopData, SnapshotData};

mod mock;
mod wire;

pub use mock::{MockInventoryPort, POP_FILE, SNAPSHOT_FILE};
pub use wire::pop_city_key;

/// Public GraphQL endpoint.
pub const API_URL: &str = "https://api.catonetworks.com/api/v1/graphql2";

const SNAPSHOT_QUERY: &str = "query accountSnapshot($accountID: ID!) {
  accountSnapshot(accountID: $accountID) {
    sites {
      id
      connectivityStatus
      info { name countryCode }
      devices {
        interfaces {
          tunnelRemoteIPInfo { latitude longitude }
          popName
        }
      }
    }
  }
}";

const POP_QUERY: &str = "query popLocationList($accountId: ID!) {
  popLocations(accountId: $accountId) {
    popLocationList {
      items {
        id
        name
        displayName
        country { id name }
        isPrivate
      }
    }
  }
}";

/// Credentials and endpoint of one Cato account.
#[derive(Debug, Clone)]
pub struct CatoConfig {
    /// Account the queries run against.
    pub account_id: String,
    /// API key sent as `X-api-key`.
    pub api_key: String,
    /// GraphQL endpoint, normally [`API_URL`].
    pub url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Request<'query> {
    operation_name: &'query str,
    query: &'query str,
    variables: serde_json::Value,
}

/// Thin GraphQL client; one POST per operation.
pub struct CatoClient {
    client: Client,
    config: CatoConfig,
}

impl CatoClient {
    /// Create a client bound to the given HTTP client and account.
    #[must_use]
    pub fn new(client: Client, config: CatoConfig) -> Self {
        Self { client, config }
    }

    /// Run one operation and return its `data` member.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Network`] on transport or HTTP status failures,
    /// [`PortError::Api`] when the response carries GraphQL errors, and
    /// [`PortError::Malformed`] when it carries neither data nor errors.
    pub async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, PortError> {
        debug!(operation, "sending GraphQL request");
        let req = self
            .client
            .post(&self.config.url)
            .header("X-api-key", &self.config.api_key)
            .json(&Request {
                operation_name: operation,
                query,
                variables,
            });
        let envelope: Envelope<T> = fetch_json(req).await?;
        unwrap_envelope(operation, envelope)
    }
}

/// Live inventory reading `accountSnapshot` and `popLocationList`.
pub struct CatoInventoryPort {
    client: CatoClient,
    meta: SourceMeta,
}

impl CatoInventoryPort {
    /// Create an inventory port for the configured account.
    #[must_use]
    pub fn new(client: Client, config: CatoConfig) -> Self {
        let meta = SourceMeta {
            id: format!("cato:{}", config.account_id),
            name: String::from("Cato Networks"),
        };
        Self {
            client: CatoClient::new(client, config),
            meta,
        }
    }
}

#[async_trait]
impl InventoryPort for CatoInventoryPort {
    fn source(&self) -> &SourceMeta {
        &self.meta
    }

    async fn sites(&self) -> Result<Vec<RawSite>, PortError> {
        let variables = json!({ "accountID": self.client.config.account_id });
        let data: SnapshotData = self
            .client
            .send("accountSnapshot", SNAPSHOT_QUERY, variables)
            .await?;
        Ok(data
            .account_snapshot
            .sites
            .into_iter()
            .map(RawSite::from)
            .collect())
    }

    async fn pops(&self) -> Result<Vec<RawPop>, PortError> {
        let variables = json!({ "accountId": self.client.config.account_id });
        let data: PopData = self
            .client
            .send("popLocationList", POP_QUERY, variables)
            .await?;
        Ok(data
            .pop_locations
            .pop_location_list
            .items
            .into_iter()
            .map(RawPop::from)
            .collect())
    }
}

/// Build the live inventory port for an account.
#[must_use]
pub fn inventory(client: Client, config: CatoConfig) -> Arc<dyn InventoryPort> {
    Arc::new(CatoInventoryPort::new(client, config))
}

fn unwrap_envelope<T>(operation: &str, envelope: Envelope<T>) -> Result<T, PortError> {
    if !envelope.errors.is_empty() {
        let message = envelope
            .errors
            .into_iter()
            .map(|error| error.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PortError::Api {
            status: 200,
            message: format!("{operation}: {message}"),
        });
    }
    envelope
        .data
        .ok_or_else(|| PortError::Malformed(format!("{operation}: response has no data")))
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_errors_become_api_errors() {
        let envelope: Envelope<SnapshotData> = serde_json::from_str(
            r#"{"errors": [{"message": "permission denied"}, {"message": "try again"}]}"#,
        )
        .expect("envelope");
        let error = unwrap_envelope("accountSnapshot", envelope).expect_err("errors present");
        assert!(
            matches!(
                &error,
                PortError::Api { status: 200, message }
                    if message == "accountSnapshot: permission denied; try again"
            ),
            "all messages are kept, got {error}"
        );
    }

    #[test]
    fn missing_data_is_malformed() {
        let envelope: Envelope<PopData> = serde_json::from_str("{}").expect("envelope");
        let error = unwrap_envelope("popLocationList", envelope).expect_err("no data");
        assert!(matches!(error, PortError::Malformed(_)), "no data and no errors");
    }

    #[test]
    fn data_is_unwrapped() {
        let envelope: Envelope<PopData> = serde_json::from_str(
            r#"{"data": {"popLocations": {"popLocationList": {"items": [
                {"id": "1", "name": "Tokyo_AWS", "country": {"id": "JP", "name": "Japan"}}
            ]}}}}"#,
        )
        .expect("envelope");
        let data = unwrap_envelope("popLocationList", envelope).expect("data present");
        let pops: Vec<RawPop> = data
            .pop_locations
            .pop_location_list
            .items
            .into_iter()
            .map(RawPop::from)
            .collect();
        assert_eq!(pops.len(), 1, "one POP");
        assert_eq!(
            pops.first().and_then(|pop| pop.city.as_deref()),
            Some("tokyo"),
            "cloud suffix removed"
        );
    }

    #[test]
    fn request_body_uses_graphql_field_names() {
        let body = serde_json::to_value(Request {
            operation_name: "accountSnapshot",
            query: SNAPSHOT_QUERY,
            variables: json!({ "accountID": "42" }),
        })
        .expect("serializable");
        assert_eq!(body["operationName"], "accountSnapshot", "camelCase operation");
        assert_eq!(body["variables"]["accountID"], "42", "variables passed through");
    }
}
