//! Credentials and endpoints taken from the environment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use popmap_provider_cato::CatoConfig;
use popmap_provider_openai::OpenAiConfig;
use tracing::{debug, warn};

/// Read a `.env` file from the working directory, if there is one.
///
/// Runs before logging is set up, so the outcome is returned for the caller to report.
pub(crate) fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(error) if error.not_found() => Ok(None),
        Err(error) => Err(error),
    }
}

/// Log what [`load_dotenv`] did.
pub(crate) fn report_dotenv(outcome: &Result<Option<PathBuf>, dotenvy::Error>) {
    match outcome {
        Ok(Some(path)) => debug!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(error) => warn!(%error, "ignoring unreadable .env"),
    }
}

/// Look up a process environment variable, treating blank values as unset.
pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Cato account settings: `CATO_ACCOUNT_ID`, `CATO_API_KEY`, optional `CATO_API_URL`.
pub(crate) fn cato_config(lookup: impl Fn(&str) -> Option<String>) -> Result<CatoConfig> {
    Ok(CatoConfig {
        account_id: lookup("CATO_ACCOUNT_ID")
            .context("CATO_ACCOUNT_ID must be set for live runs (or pass --example)")?,
        api_key: lookup("CATO_API_KEY")
            .context("CATO_API_KEY must be set for live runs (or pass --example)")?,
        url: lookup("CATO_API_URL").unwrap_or_else(|| popmap_provider_cato::API_URL.to_owned()),
    })
}

/// Estimator settings: `OPENAI_API_KEY`, optional `OPENAI_MODEL` and `OPENAI_BASE_URL`.
pub(crate) fn openai_config(lookup: impl Fn(&str) -> Option<String>) -> Result<OpenAiConfig> {
    let mut config = OpenAiConfig::new(
        lookup("OPENAI_API_KEY").context("OPENAI_API_KEY must be set when --enrich is used")?,
    );
    if let Some(model) = lookup("OPENAI_MODEL") {
        config.model = model;
    }
    if let Some(base_url) = lookup("OPENAI_BASE_URL") {
        config.base_url = base_url;
    }
    Ok(config)
}
