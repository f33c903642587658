//! Stage-qualified pipeline errors.

use std::path::PathBuf;

use crime_route_config::ConfigError;
use crime_route_crime_models::InvalidHourError;
use crime_route_geocoder::GeocodeError;
use crime_route_graph::GraphError;
use crime_route_risk::RiskError;
use crime_route_routing::RouteError;
use thiserror::Error;

/// Any failure of a CLI run, labelled with the stage it happened in.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("{stage}: failed to read {path}: {source}")]
    Input {
        stage: &'static str,
        path: PathBuf,
        source: csv::Error,
    },

    #[error("{stage}: failed to write {path}: {source}")]
    Output {
        stage: &'static str,
        path: PathBuf,
        source: csv::Error,
    },

    #[error("geocode: {0}")]
    Geocode(#[from] GeocodeError),

    #[error("risk surface ({bucket}): {source}")]
    RiskSurface { bucket: String, source: RiskError },

    #[error("annotate: {0}")]
    Annotate(GraphError),

    #[error("route: {0}")]
    Route(#[from] RouteError),

    #[error("{0}")]
    Hour(#[from] InvalidHourError),

    #[error("prompt: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl From<GraphError> for PipelineError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Annotate { bucket, source } => Self::RiskSurface { bucket, source },
            other => Self::Annotate(other),
        }
    }
}
