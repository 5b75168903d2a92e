//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;
use popmap_core::enrichment::DEFAULT_BATCH_SIZE;

#[derive(Parser, Debug)]
#[command(
    name = "popmap",
    version,
    about = "Resolve site locations and match connected sites to their nearest POP"
)]
pub(crate) struct Args {
    /// Read saved API responses instead of calling the Cato API.
    #[arg(long)]
    pub(crate) example: bool,

    /// Directory holding mock_accountSnapshot.json and mock_popLocationList.json.
    #[arg(long, env = "POPMAP_MOCK_DIR", default_value = "data")]
    pub(crate) mock_dir: PathBuf,

    /// Country centroid table.
    #[arg(long, env = "POPMAP_COUNTRIES", default_value = "data/cclatlong.csv")]
    pub(crate) countries: PathBuf,

    /// City table.
    #[arg(long, env = "POPMAP_CITIES", default_value = "data/worldcities.csv")]
    pub(crate) cities: PathBuf,

    /// Estimate locations from site names for sites without a known city.
    #[arg(long)]
    pub(crate) enrich: bool,

    /// Sites per estimation call.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub(crate) batch_size: usize,

    /// Estimation calls in flight at once.
    #[arg(long, default_value_t = 1)]
    pub(crate) concurrency: usize,

    /// Where to write the topology JSON.
    #[arg(long, short, default_value = "popmap_topology.json")]
    pub(crate) output: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short)]
    pub(crate) verbose: bool,
}
