//! Per-route distance, time and risk figures.

use crime_route_graph::StreetGraph;
use serde::Serialize;

use crate::astar::Path;

/// Default walking pace in km/h.
pub const DEFAULT_WALKING_SPEED_KMH: f64 = 5.0;

/// Distance, time and risk along one path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RouteStats {
    /// Sum of edge lengths, in meters.
    pub distance_m: f64,
    /// Length-weighted mean risk, `sum(risk * length) / sum(length)`.
    pub avg_risk: f64,
    /// Highest single-edge risk.
    pub max_risk: f64,
    /// `sum(risk * length)`.
    pub total_risk_exposure: f64,
    /// Walking time in minutes.
    pub time_min: f64,
    /// Number of edges.
    pub num_edges: usize,
}

impl RouteStats {
    /// Distance in kilometers.
    #[must_use]
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }
}

/// Computes [`RouteStats`] for `path`, reading risk from `risk_attr`.
#[must_use]
pub fn calc_route_stats(
    graph: &StreetGraph,
    path: &Path,
    risk_attr: &str,
    walking_speed_kmh: f64,
) -> RouteStats {
    let mut stats = RouteStats {
        num_edges: path.edges.len(),
        ..RouteStats::default()
    };

    for edge in path.edges.iter().filter_map(|id| graph.edge(*id)) {
        let risk = edge.attribute_f64(risk_attr).max(0.0);
        stats.distance_m += edge.length;
        stats.total_risk_exposure += risk * edge.length;
        stats.max_risk = stats.max_risk.max(risk);
    }

    if stats.distance_m > 0.0 {
        stats.avg_risk = stats.total_risk_exposure / stats.distance_m;
    }
    if walking_speed_kmh > 0.0 {
        let meters_per_minute = walking_speed_kmh * 1000.0 / 60.0;
        stats.time_min = stats.distance_m / meters_per_minute;
    }

    stats
}
