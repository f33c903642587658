#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safe-versus-fast walking routes over a risk-annotated street graph.
//!
//! Endpoints are snapped to their nearest graph nodes ([`nearest`]), an
//! A* search ([`astar`]) runs once on `length` and once on `risk_cost`,
//! and [`stats`] / [`evaluate`] turn the two paths into a comparison of
//! distance, walking time and crime exposure.

pub mod astar;
pub mod evaluate;
pub mod nearest;
pub mod pairs;
pub mod stats;

use std::path::PathBuf;

pub use astar::{Heuristic, Path, Weight, astar_path};
pub use evaluate::{
    EvaluationSummary, LocatedPair, RouteComparison, RouteEvaluator, summarize, write_report_csv,
};
pub use pairs::{Endpoint, RoutePair, read_route_pairs};
pub use stats::{RouteStats, calc_route_stats};

use crime_route_graph::NodeId;
use crime_route_risk::CrsError;
use thiserror::Error;

/// Errors from route search and evaluation.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The graph has no nodes to route over.
    #[error("Graph has no nodes")]
    EmptyGraph,

    /// A node id is not in the graph.
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    /// The target cannot be reached from the source.
    #[error("No path from node {from} to node {to}")]
    NoPath {
        /// Source node.
        from: NodeId,
        /// Target node.
        to: NodeId,
    },

    /// An endpoint could not be projected into the graph's CRS.
    #[error(transparent)]
    Crs(#[from] CrsError),

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV input or output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A row of a pairs file is unusable.
    #[error("Invalid route pair on line {line}: {message}")]
    InvalidPair {
        /// 1-based line number.
        line: usize,
        /// What is wrong with the row.
        message: String,
    },
}
