//! Annotated graph cache.
//!
//! Annotating a city-sized graph takes a long time, so annotated graphs
//! are kept in `<cache_dir>/annotated_graph.json`. Every bucket's scores
//! accumulate in that one file; a bucket is recomputed only when some
//! edge lacks its attribute or when forced.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crime_route_crime_models::{TimeBucket, WeightedCrimePoint};
use crime_route_progress::ProgressCallback;

use crate::GraphError;
use crate::annotate::{AnnotateOptions, annotate_graph};
use crate::model::StreetGraph;
use crate::store::{load_graph, save_graph};

/// File name of the cached annotated graph.
pub const ANNOTATED_GRAPH_FILE: &str = "annotated_graph.json";

/// Whether a bucket was served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Every edge already carried the bucket's scores.
    Hit,
    /// Scores were computed and the cache rewritten.
    Computed,
}

/// The annotated graph cache rooted at a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCache {
    dir: PathBuf,
}

impl GraphCache {
    /// A cache in `dir`. Nothing is created until the first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the cached annotated graph.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(ANNOTATED_GRAPH_FILE)
    }

    /// Loads the cached graph, or `base_graph` when there is no cache yet.
    ///
    /// # Errors
    ///
    /// Propagates [`load_graph`] failures.
    pub fn load_or_base(&self, base_graph: &Path) -> Result<StreetGraph, GraphError> {
        let cached = self.path();
        if cached.exists() {
            log::info!("Using cached annotated graph {}", cached.display());
            load_graph(&cached)
        } else {
            log::info!("No annotated graph cache, loading {}", base_graph.display());
            load_graph(base_graph)
        }
    }

    /// Writes `graph` as the cached annotated graph.
    ///
    /// # Errors
    ///
    /// Propagates [`save_graph`] failures.
    pub fn store(&self, graph: &StreetGraph) -> Result<(), GraphError> {
        save_graph(graph, &self.path())
    }

    /// Returns a graph carrying `bucket`'s scores, computing and caching
    /// them only if needed.
    ///
    /// # Errors
    ///
    /// Propagates load, annotation and save failures.
    pub fn annotate(
        &self,
        base_graph: &Path,
        points: &[WeightedCrimePoint],
        bucket: TimeBucket,
        options: &AnnotateOptions,
        force: bool,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<(StreetGraph, CacheOutcome), GraphError> {
        let graph = self.load_or_base(base_graph)?;
        let attribute = bucket.attribute_name();

        if !force && graph.has_attribute_everywhere(&attribute) {
            log::info!("{attribute} already present on every edge, skipping KDE");
            return Ok((graph, CacheOutcome::Hit));
        }

        let annotated = annotate_graph(&graph, points, bucket, options, progress)?;
        self.store(&annotated)?;
        Ok((annotated, CacheOutcome::Computed))
    }
}
