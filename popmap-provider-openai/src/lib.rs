//! Site location estimator backed by an OpenAI-compatible chat-completions API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use tracing::debug;

use popmap_core::{
    model::SourceMeta,
    ports::{EstimateRequest, EstimatorPort, PortError, RawEstimate},
};

use crate::chat::{ChatResponse, build_request, parse_response};

mod chat;

/// Public API root.
pub const API_URL: &str = "https://api.openai.com/v1";
/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Credentials and model selection.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Bearer token.
    pub api_key: String,
    /// Chat model name.
    pub model: String,
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
}

impl OpenAiConfig {
    /// Configuration for the public API and the default model.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: API_URL.to_owned(),
        }
    }
}

/// Estimator sending one chat completion per batch.
pub struct OpenAiEstimator {
    client: Client,
    config: OpenAiConfig,
    meta: SourceMeta,
}

impl OpenAiEstimator {
    /// Create an estimator bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, config: OpenAiConfig) -> Self {
        let meta = SourceMeta {
            id: format!("openai:{}", config.model),
            name: String::from("OpenAI chat completions"),
        };
        Self {
            client,
            config,
            meta,
        }
    }
}

#[async_trait]
impl EstimatorPort for OpenAiEstimator {
    fn source(&self) -> &SourceMeta {
        &self.meta
    }

    async fn estimate(&self, batch: &[EstimateRequest]) -> Result<Vec<RawEstimate>, PortError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = build_request(&self.config.model, batch)?;
        debug!(model = %self.config.model, sites = batch.len(), "chat completion request");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await?;
            return Err(PortError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatResponse = response.json().await?;
        parse_response(completion)
    }
}

/// Build the estimator port.
#[must_use]
pub fn estimator(client: Client, config: OpenAiConfig) -> Arc<dyn EstimatorPort> {
    Arc::new(OpenAiEstimator::new(client, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_the_model() {
        let mut config = OpenAiConfig::new("key".into());
        config.model = "gpt-4.1-nano".into();
        let estimator = OpenAiEstimator::new(Client::new(), config);
        assert_eq!(estimator.source().id, "openai:gpt-4.1-nano", "model in source id");
    }

    #[tokio::test]
    async fn empty_batch_makes_no_call() {
        let mut config = OpenAiConfig::new("key".into());
        config.base_url = "http://127.0.0.1:9".into();
        let estimator = OpenAiEstimator::new(Client::new(), config);
        let entries = estimator.estimate(&[]).await.expect("nothing to send");
        assert!(entries.is_empty(), "no entries");
    }
}
