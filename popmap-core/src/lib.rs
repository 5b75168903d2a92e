//! Core types and pipeline for popmap, a site-to-POP topology engine.
//!
//! Raw inventory records flow through the [`builder`], get coordinates from the [`resolver`]
//! (optionally helped by the [`enrichment`] batcher), and are matched to POPs by the
//! [`matcher`]. [`service::TopologyService`] wires the stages together.

/// Validation of raw records into the canonical model.
pub mod builder;
/// Batched location estimation with a per-run cache.
pub mod enrichment;
/// Error types for model construction, enrichment, and the pipeline.
pub mod error;
/// Country and city lookup tables plus distance math.
pub mod geo;
/// Nearest-POP and endpoint-identity matching.
pub mod matcher;
/// Domain models and identifiers.
pub mod model;
/// Traits describing the inventory and estimator collaborators.
pub mod ports;
/// The ordered coordinate resolution chain.
pub mod resolver;
/// High-level service facade used by clients.
pub mod service;

pub use builder::*;
pub use enrichment::*;
pub use error::*;
pub use geo::*;
pub use matcher::*;
pub use model::*;
pub use ports::*;
pub use resolver::*;
pub use service::*;
