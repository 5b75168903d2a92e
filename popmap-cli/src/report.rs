//! Run summary logging and topology output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use popmap_core::model::Topology;
use tracing::{info, warn};

/// Log the counters of a finished topology.
pub(crate) fn log_summary(topology: &Topology) {
    let summary = &topology.summary;
    info!(
        source = %topology.source.name,
        sites = summary.sites,
        connected = summary.connected,
        disconnected = summary.disconnected,
        pops = summary.pops,
        empty_pops = summary.empty_pops,
        connections = summary.connections,
        "topology summary"
    );
    for (method, count) in &summary.methods {
        info!(method = %method, sites = count, "resolution method");
    }
    if summary.rejected_sites > 0 || summary.rejected_pops > 0 {
        warn!(
            sites = summary.rejected_sites,
            pops = summary.rejected_pops,
            "records rejected during model construction"
        );
    }
    if !topology.unmatched.is_empty() {
        warn!(count = topology.unmatched.len(), "connected sites without a POP");
    }
    if let Some(enrichment) = &topology.enrichment {
        info!(
            requested = enrichment.requested,
            estimated = enrichment.estimated,
            failed_batches = enrichment.failed_batches,
            malformed_entries = enrichment.malformed_entries,
            cache_hits = enrichment.cache_hits,
            "enrichment summary"
        );
    }
}

/// Write the topology as pretty-printed JSON.
pub(crate) fn write_json(path: &Path, topology: &Topology) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, topology)
        .with_context(|| format!("cannot serialize topology to {}", path.display()))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!(path = %path.display(), "topology written");
    Ok(())
}
