//! Fastest-versus-safest route comparison.
//!
//! For each start/end pair the evaluator snaps both endpoints to their
//! nearest graph nodes, searches once on `length` and once on the risk
//! cost, and reports how much extra distance and time the safer route
//! costs against how much risk it avoids.

use std::path::Path as FsPath;
use std::sync::Arc;

use crime_route_graph::{NodeId, StreetGraph};
use crime_route_progress::ProgressCallback;
use crime_route_risk::Transformer;
use serde::Serialize;

use crate::RouteError;
use crate::astar::{Heuristic, Path, Weight, astar_path};
use crate::nearest::NodeLocator;
use crate::stats::{RouteStats, calc_route_stats};

/// `(a - b) / b * 100`, or 0 when `b` is not positive.
#[must_use]
pub fn percent_increase(a: f64, b: f64) -> f64 {
    if b > 0.0 { (a - b) / b * 100.0 } else { 0.0 }
}

/// `(1 - a / b) * 100`, or 0 when `b` is not positive.
#[must_use]
pub fn percent_reduction(a: f64, b: f64) -> f64 {
    if b > 0.0 { (1.0 - a / b) * 100.0 } else { 0.0 }
}

/// Both routes for one start/end pair with derived comparison metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteComparison {
    /// Start label (address or coordinates).
    pub start: String,
    /// End label.
    pub end: String,
    /// Nearest node to the start.
    pub orig_node: NodeId,
    /// Nearest node to the end.
    pub dest_node: NodeId,
    /// Distance-minimizing route.
    pub fast: RouteStats,
    /// Risk-cost-minimizing route.
    pub safe: RouteStats,
    /// Extra distance of the safe route, percent.
    pub distance_increase_pct: f64,
    /// Extra time of the safe route, percent.
    pub time_increase_pct: f64,
    /// Average risk avoided by the safe route, percent.
    pub risk_reduction_pct: f64,
    /// Total exposure avoided by the safe route, percent.
    pub exposure_reduction_pct: f64,
}

impl RouteComparison {
    /// Derives the comparison metrics from two routes.
    #[must_use]
    pub fn new(
        start: String,
        end: String,
        (orig_node, dest_node): (NodeId, NodeId),
        fast: RouteStats,
        safe: RouteStats,
    ) -> Self {
        Self {
            distance_increase_pct: percent_increase(safe.distance_km(), fast.distance_km()),
            time_increase_pct: percent_increase(safe.time_min, fast.time_min),
            risk_reduction_pct: percent_reduction(safe.avg_risk, fast.avg_risk),
            exposure_reduction_pct: percent_reduction(
                safe.total_risk_exposure,
                fast.total_risk_exposure,
            ),
            start,
            end,
            orig_node,
            dest_node,
            fast,
            safe,
        }
    }
}

/// Averages over a set of comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EvaluationSummary {
    /// Number of compared pairs.
    pub pairs: usize,
    /// Mean distance increase, percent.
    pub avg_distance_increase_pct: f64,
    /// Mean time increase, percent.
    pub avg_time_increase_pct: f64,
    /// Mean risk reduction, percent.
    pub avg_risk_reduction_pct: f64,
    /// Mean exposure reduction, percent.
    pub avg_exposure_reduction_pct: f64,
}

impl std::fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Routes compared: {}", self.pairs)?;
        writeln!(
            f,
            "Average distance increase (%): {:.2}",
            self.avg_distance_increase_pct
        )?;
        writeln!(
            f,
            "Average time increase (%): {:.2}",
            self.avg_time_increase_pct
        )?;
        writeln!(
            f,
            "Average risk reduction (%): {:.2}",
            self.avg_risk_reduction_pct
        )?;
        write!(
            f,
            "Average exposure reduction (%): {:.2}",
            self.avg_exposure_reduction_pct
        )
    }
}

/// Averages the comparison metrics. All zero for no comparisons.
#[must_use]
pub fn summarize(comparisons: &[RouteComparison]) -> EvaluationSummary {
    if comparisons.is_empty() {
        return EvaluationSummary::default();
    }
    #[allow(clippy::cast_precision_loss)]
    let n = comparisons.len() as f64;
    let mean = |f: fn(&RouteComparison) -> f64| comparisons.iter().map(f).sum::<f64>() / n;

    EvaluationSummary {
        pairs: comparisons.len(),
        avg_distance_increase_pct: mean(|c| c.distance_increase_pct),
        avg_time_increase_pct: mean(|c| c.time_increase_pct),
        avg_risk_reduction_pct: mean(|c| c.risk_reduction_pct),
        avg_exposure_reduction_pct: mean(|c| c.exposure_reduction_pct),
    }
}

/// Route search and scoring over one annotated graph.
///
/// The graph is only read, so one evaluator can serve many pairs.
pub struct RouteEvaluator<'a> {
    graph: &'a StreetGraph,
    locator: NodeLocator,
    transformer: Transformer,
    heuristic: Heuristic,
    risk_attr: String,
    cost_attr: String,
    walking_speed_kmh: f64,
}

impl<'a> RouteEvaluator<'a> {
    /// Prepares an evaluator. `risk_attr` is the density score used for
    /// statistics, `cost_attr` the weight minimized by the safe search.
    ///
    /// The Euclidean heuristic is used for projected graphs; graphs in
    /// geographic coordinates fall back to uniform-cost search because
    /// degree distances are not comparable to metric edge weights.
    ///
    /// # Errors
    ///
    /// * [`RouteError::EmptyGraph`] if the graph has no nodes.
    /// * [`RouteError::Crs`] if the graph's CRS is unsupported.
    pub fn new(
        graph: &'a StreetGraph,
        risk_attr: &str,
        cost_attr: &str,
        walking_speed_kmh: f64,
    ) -> Result<Self, RouteError> {
        if graph.node_count() == 0 {
            return Err(RouteError::EmptyGraph);
        }
        let crs = graph.crs()?;
        let heuristic = if crs.is_geographic() {
            Heuristic::None
        } else {
            Heuristic::Euclidean
        };

        Ok(Self {
            graph,
            locator: NodeLocator::new(graph),
            transformer: Transformer::new(crs),
            heuristic,
            risk_attr: risk_attr.to_string(),
            cost_attr: cost_attr.to_string(),
            walking_speed_kmh,
        })
    }

    /// Snaps a WGS84 coordinate to the nearest graph node.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Crs`] if the coordinate cannot be projected
    /// and [`RouteError::EmptyGraph`] if no node is indexed.
    pub fn nearest_node(&self, lon: f64, lat: f64) -> Result<NodeId, RouteError> {
        let (x, y) = self.transformer.forward(lon, lat)?;
        self.locator.nearest(x, y).ok_or(RouteError::EmptyGraph)
    }

    /// Finds the fastest and safest paths between two nodes.
    ///
    /// # Errors
    ///
    /// Propagates [`astar_path`] failures.
    pub fn find_paths(&self, orig: NodeId, dest: NodeId) -> Result<(Path, Path), RouteError> {
        let safe = astar_path(
            self.graph,
            orig,
            dest,
            Weight::Attribute(&self.cost_attr),
            self.heuristic,
        )?;
        let fast = astar_path(
            self.graph,
            orig,
            dest,
            Weight::Length,
            self.heuristic,
        )?;
        Ok((fast, safe))
    }

    /// Compares the fastest and safest routes between two nodes.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::find_paths`] failures.
    pub fn compare_nodes(
        &self,
        start: String,
        end: String,
        orig: NodeId,
        dest: NodeId,
    ) -> Result<RouteComparison, RouteError> {
        let (fast, safe) = self.find_paths(orig, dest)?;
        let fast = calc_route_stats(self.graph, &fast, &self.risk_attr, self.walking_speed_kmh);
        let safe = calc_route_stats(self.graph, &safe, &self.risk_attr, self.walking_speed_kmh);
        Ok(RouteComparison::new(start, end, (orig, dest), fast, safe))
    }

    /// Compares the fastest and safest routes between two WGS84
    /// coordinates.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::nearest_node`] and [`Self::find_paths`]
    /// failures.
    pub fn evaluate_route(
        &self,
        start: String,
        end: String,
        (start_lon, start_lat): (f64, f64),
        (end_lon, end_lat): (f64, f64),
    ) -> Result<RouteComparison, RouteError> {
        let orig = self.nearest_node(start_lon, start_lat)?;
        let dest = self.nearest_node(end_lon, end_lat)?;
        log::info!("Routing {start} ({orig}) -> {end} ({dest})");
        self.compare_nodes(start, end, orig, dest)
    }

    /// Evaluates many located pairs, reporting progress. Pairs that fail
    /// are logged and skipped.
    pub fn evaluate_all(
        &self,
        pairs: &[LocatedPair],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Vec<RouteComparison> {
        progress.set_total(pairs.len() as u64);
        let mut comparisons = Vec::with_capacity(pairs.len());

        for pair in pairs {
            progress.set_message(format!("{} -> {}", pair.start, pair.end));
            let result = self.evaluate_route(
                pair.start.clone(),
                pair.end.clone(),
                pair.start_lon_lat,
                pair.end_lon_lat,
            );
            match result {
                Ok(comparison) => comparisons.push(comparison),
                Err(e) => log::warn!("Skipping {} -> {}: {e}", pair.start, pair.end),
            }
            progress.inc(1);
        }

        progress.finish(format!(
            "Evaluated {} of {} routes",
            comparisons.len(),
            pairs.len()
        ));
        comparisons
    }
}

/// A start/end pair with WGS84 coordinates resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedPair {
    /// Start label.
    pub start: String,
    /// End label.
    pub end: String,
    /// Start `(lon, lat)`.
    pub start_lon_lat: (f64, f64),
    /// End `(lon, lat)`.
    pub end_lon_lat: (f64, f64),
}

#[derive(Serialize)]
struct ReportRow<'a> {
    #[serde(rename = "Start")]
    start: &'a str,
    #[serde(rename = "End")]
    end: &'a str,
    #[serde(rename = "Fast: Distance (km)")]
    fast_distance_km: f64,
    #[serde(rename = "Safe: Distance (km)")]
    safe_distance_km: f64,
    #[serde(rename = "Distance Increase (%)")]
    distance_increase_pct: f64,
    #[serde(rename = "Fast: Time (min)")]
    fast_time_min: f64,
    #[serde(rename = "Safe: Time (min)")]
    safe_time_min: f64,
    #[serde(rename = "Time Increase (%)")]
    time_increase_pct: f64,
    #[serde(rename = "Fast: Average Risk")]
    fast_avg_risk: f64,
    #[serde(rename = "Safe: Average Risk")]
    safe_avg_risk: f64,
    #[serde(rename = "Risk Reduction (%)")]
    risk_reduction_pct: f64,
    #[serde(rename = "Fast: Total Risk Exposure")]
    fast_exposure: f64,
    #[serde(rename = "Safe: Total Risk Exposure")]
    safe_exposure: f64,
    #[serde(rename = "Exposure Reduction (%)")]
    exposure_reduction_pct: f64,
}

impl<'a> From<&'a RouteComparison> for ReportRow<'a> {
    fn from(c: &'a RouteComparison) -> Self {
        Self {
            start: &c.start,
            end: &c.end,
            fast_distance_km: c.fast.distance_km(),
            safe_distance_km: c.safe.distance_km(),
            distance_increase_pct: c.distance_increase_pct,
            fast_time_min: c.fast.time_min,
            safe_time_min: c.safe.time_min,
            time_increase_pct: c.time_increase_pct,
            fast_avg_risk: c.fast.avg_risk,
            safe_avg_risk: c.safe.avg_risk,
            risk_reduction_pct: c.risk_reduction_pct,
            fast_exposure: c.fast.total_risk_exposure,
            safe_exposure: c.safe.total_risk_exposure,
            exposure_reduction_pct: c.exposure_reduction_pct,
        }
    }
}

/// Writes one CSV row per comparison.
///
/// # Errors
///
/// Returns [`RouteError::Csv`] if the file cannot be written.
pub fn write_report_csv(path: &FsPath, comparisons: &[RouteComparison]) -> Result<(), RouteError> {
    let mut writer = csv::Writer::from_path(path)?;
    for comparison in comparisons {
        writer.serialize(ReportRow::from(comparison))?;
    }
    writer.flush().map_err(|source| RouteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(
        "Wrote {} route comparisons to {}",
        comparisons.len(),
        path.display()
    );
    Ok(())
}
