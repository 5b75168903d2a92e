//! Command line front end for popmap: resolves Cato site locations and matches sites to POPs.

mod args;
mod config;
mod report;
mod tables;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use popmap_core::{
    enrichment::EnrichmentOptions, geo::GeoIndex, ports::InventoryPort, service::TopologyService,
};
use popmap_provider_cato::{self as cato, MockInventoryPort};
use popmap_provider_openai as openai;
use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args::Args;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = config::load_dotenv();
    let args = Args::parse();
    init_tracing(args.verbose);
    config::report_dotenv(&dotenv);

    let countries = tables::load_countries(&args.countries)?;
    let cities = tables::load_cities(&args.cities)?;
    let index = Arc::new(GeoIndex::build(countries, cities).context("cannot build geo index")?);
    info!(
        countries = index.country_count(),
        city_keys = index.city_key_count(),
        "lookup tables ready"
    );

    let client = Client::builder()
        .user_agent(concat!("popmap/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let inventory: Arc<dyn InventoryPort> = if args.example {
        Arc::new(MockInventoryPort::from_dir(&args.mock_dir).with_context(|| {
            format!("cannot load mock inventory from {}", args.mock_dir.display())
        })?)
    } else {
        cato::inventory(client.clone(), config::cato_config(config::env_var)?)
    };

    let mut service = TopologyService::new(inventory, index);
    if args.enrich {
        let estimator = openai::estimator(client, config::openai_config(config::env_var)?);
        let options = EnrichmentOptions {
            batch_size: args.batch_size.max(1),
            concurrency: args.concurrency.max(1),
        };
        service = service.with_estimator(estimator, options);
    }

    let topology = service
        .build_topology()
        .await
        .context("cannot build topology")?;
    report::log_summary(&topology);
    report::write_json(&args.output, &topology)?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}
