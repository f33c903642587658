#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street graphs annotated with crime risk.
//!
//! A [`StreetGraph`] is a directed multigraph loaded from JSON. The
//! annotator ([`annotate`]) fits a risk surface per 4-hour time bucket
//! and writes a mean density score on every edge; [`cost`] turns a score
//! into a `risk_cost` search weight. Both return [`EdgePatch`]es that are
//! applied to produce new graph values.

pub mod annotate;
pub mod cache;
pub mod coerce;
pub mod cost;
pub mod model;
pub mod sample;
pub mod store;

use std::path::PathBuf;

pub use annotate::{AnnotateOptions, annotate_graph, run_kde_on_graph};
pub use cost::{RISK_COST_ATTR, add_risk_cost_weights};
pub use model::{AttrValue, Edge, EdgeId, EdgePatch, Node, NodeId, StreetGraph};
pub use store::{load_graph, save_graph};

use crime_route_risk::RiskError;
use thiserror::Error;

/// Errors from loading, annotating or saving graphs.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Reading or writing a graph file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The graph document is not valid JSON for a graph.
    #[error("Invalid graph JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An edge refers to a node that does not exist.
    #[error("Edge {edge} refers to unknown node {node}")]
    UnknownNode {
        /// The missing node.
        node: NodeId,
        /// The dangling edge.
        edge: EdgeId,
    },

    /// A patch refers to an edge that does not exist.
    #[error("Patch refers to unknown edge {0}")]
    UnknownEdge(EdgeId),

    /// A patch tried to overwrite a structural edge field.
    #[error("Attribute {0:?} is reserved")]
    ReservedAttribute(String),

    /// The graph's CRS or the crime data could not be used.
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// Fitting the risk surface for a time bucket failed.
    #[error("Risk surface for bucket {bucket} failed: {source}")]
    Annotate {
        /// The time bucket being annotated.
        bucket: String,
        /// Underlying failure.
        source: RiskError,
    },
}
