//! Per-edge crime risk scores for one time-of-day bucket.
//!
//! Crime points active during the bucket are fitted into a risk surface
//! in the graph's own CRS, or in the local UTM zone when the graph is in
//! longitude/latitude. Every edge is sampled at a fixed step in that
//! frame, all samples from all edges are evaluated in one pass, and each
//! edge scores the mean density over its samples.

use std::ops::Range;
use std::sync::Arc;

use crime_route_crime_models::{TimeBucket, WeightedCrimePoint};
use crime_route_progress::ProgressCallback;
use crime_route_risk::{Crs, RiskSurface, RiskSurfaceOptions, Transformer, build_risk_surface};
use geo::{BoundingRect, Coord, LineString, MultiPoint};

use crate::GraphError;
use crate::model::{EdgeId, EdgePatch, StreetGraph};
use crate::sample::sample_along;

/// Default distance between samples along an edge, in meters (map units
/// for projected graphs).
pub const DEFAULT_STEP: f64 = 25.0;

const LOG_EVERY_EDGES: usize = 1000;

/// Parameters for [`run_kde_on_graph`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotateOptions {
    /// Distance between samples along an edge.
    pub step: f64,
    /// Risk surface fitting.
    pub surface: RiskSurfaceOptions,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            surface: RiskSurfaceOptions::default(),
        }
    }
}

/// Points whose interval of day contains the bucket's hour.
#[must_use]
pub fn bucket_points(points: &[WeightedCrimePoint], bucket: TimeBucket) -> Vec<WeightedCrimePoint> {
    points
        .iter()
        .filter(|p| p.active_at(bucket.hour()))
        .cloned()
        .collect()
}

/// The planar CRS edges are scored in: the graph's own CRS, or for
/// longitude/latitude graphs the UTM zone at the center of their nodes.
#[must_use]
pub fn scoring_crs(graph: &StreetGraph, graph_crs: Crs) -> Crs {
    if !graph_crs.is_geographic() {
        return graph_crs;
    }
    let nodes: MultiPoint<f64> = graph
        .nodes()
        .filter(|(_, n)| n.x.is_finite() && n.y.is_finite())
        .map(|(_, n)| (n.x, n.y))
        .collect();
    nodes.bounding_rect().map_or(graph_crs, |rect| {
        let center = rect.center();
        Crs::utm_for_lon_lat(center.x, center.y)
    })
}

/// Projects a longitude/latitude polyline. `None` if any vertex is
/// outside the projection's domain.
fn project_line(line: &LineString<f64>, transformer: &Transformer) -> Option<LineString<f64>> {
    line.coords()
        .map(|c| transformer.forward(c.x, c.y).ok().map(|(x, y)| Coord { x, y }))
        .collect::<Option<Vec<_>>>()
        .map(LineString::new)
}

/// Samples every edge, projecting each polyline with `reproject` first
/// when given. Returns the flat sample list and, per edge, the range of
/// its samples in that list.
pub fn sample_edges(
    graph: &StreetGraph,
    step: f64,
    reproject: Option<&Transformer>,
    progress: &Arc<dyn ProgressCallback>,
) -> (Vec<[f64; 2]>, Vec<(EdgeId, Range<usize>)>) {
    let total = graph.edge_count();
    progress.set_total(total as u64);
    progress.set_message("Sampling edges".to_string());

    let mut samples = Vec::new();
    let mut ranges = Vec::with_capacity(total);

    for (i, (id, _)) in graph.edges_with_ids().enumerate() {
        let start = samples.len();
        let line = graph.edge_line(id).and_then(|line| match reproject {
            Some(transformer) => project_line(&line, transformer),
            None => Some(line),
        });
        match line {
            Some(line) => samples.extend(sample_along(&line, step)),
            None => log::warn!("Edge {id} cannot be projected, scoring it 0"),
        }
        ranges.push((id, start..samples.len()));

        let done = i + 1;
        if done % LOG_EVERY_EDGES == 0 || done == total {
            log::info!("KDE sampled edge {id} ({done}/{total})");
        }
        progress.inc(1);
    }

    (samples, ranges)
}

/// Scores every edge of `graph` against `surface`.
///
/// Edges without samples (zero length) score `0.0`. Longitude/latitude
/// graphs are sampled after projecting into the surface's CRS.
pub fn score_edges(
    graph: &StreetGraph,
    surface: &RiskSurface,
    attribute: &str,
    step: f64,
    progress: &Arc<dyn ProgressCallback>,
) -> EdgePatch {
    let reproject = (graph.crs().is_ok_and(Crs::is_geographic)
        && !surface.crs().is_geographic())
    .then_some(surface.transformer());
    let (samples, ranges) = sample_edges(graph, step, reproject, progress);

    progress.set_message(format!("Evaluating density at {} points", samples.len()));
    let densities = surface.evaluate_kde_at_points(&samples);

    let mut patch = EdgePatch::new(attribute);
    for (id, range) in ranges {
        let score = if range.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = range.len() as f64;
            densities[range].iter().sum::<f64>() / n
        };
        patch.values.insert(id, score);
    }

    progress.finish(format!("Scored {} edges", patch.values.len()));
    patch
}

/// Computes the risk score patch for `bucket`.
///
/// The patch writes `bucket.attribute_name()` on every edge; applying it
/// leaves other buckets' scores untouched.
///
/// # Errors
///
/// * [`GraphError::Risk`] if the graph's CRS is unsupported.
/// * [`GraphError::Annotate`] if the bucket has no usable crime points.
pub fn run_kde_on_graph(
    graph: &StreetGraph,
    points: &[WeightedCrimePoint],
    bucket: TimeBucket,
    options: &AnnotateOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<EdgePatch, GraphError> {
    let graph_crs = graph.crs().map_err(crime_route_risk::RiskError::from)?;
    let crs = scoring_crs(graph, graph_crs);
    if crs != graph_crs {
        log::info!("Scoring {graph_crs} graph in {crs}");
    }
    let active = bucket_points(points, bucket);
    log::info!(
        "{} of {} crime points fall in bucket {bucket}",
        active.len(),
        points.len()
    );

    let surface =
        build_risk_surface(&active, crs, &options.surface).map_err(|source| {
            GraphError::Annotate {
                bucket: bucket.to_string(),
                source,
            }
        })?;

    Ok(score_edges(
        graph,
        &surface,
        &bucket.attribute_name(),
        options.step,
        progress,
    ))
}

/// Returns a copy of `graph` with `bucket`'s risk scores written.
///
/// # Errors
///
/// See [`run_kde_on_graph`].
pub fn annotate_graph(
    graph: &StreetGraph,
    points: &[WeightedCrimePoint],
    bucket: TimeBucket,
    options: &AnnotateOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<StreetGraph, GraphError> {
    let patch = run_kde_on_graph(graph, points, bucket, options, progress)?;
    graph.with_patch(&patch)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use crime_route_progress::null_progress;
    use crime_route_risk::Bandwidth;

    use super::*;
    use crate::model::tests::square;
    use crate::model::{Edge, Node};

    /// Crime points clustered on node 1 of the test square, split across
    /// two intervals of day.
    pub fn crimes_near_node_one(graph: &StreetGraph) -> Vec<WeightedCrimePoint> {
        let node = graph.node(1).unwrap();
        let (lon, lat) = inverse_utm19(node.x, node.y);
        let mut points = Vec::new();
        for (i, offset) in [0.0, 0.0001, -0.0001, 0.0002].iter().enumerate() {
            for interval in ["12-16", "0-4"] {
                points.push(WeightedCrimePoint {
                    lat: Some(lat + offset),
                    lon: Some(lon - offset),
                    crime_score: 1.0 + f64::from(u8::try_from(i).unwrap()),
                    neighborhood: String::new(),
                    time_interval: interval.to_string(),
                    block_address: String::new(),
                    sample_address: String::new(),
                    matched_address: None,
                });
            }
        }
        points
    }

    /// Inverts UTM 19N numerically, good to a few centimeters.
    fn inverse_utm19(x: f64, y: f64) -> (f64, f64) {
        let t = Transformer::new("EPSG:32619".parse::<Crs>().unwrap());
        let (mut lon, mut lat) = (-71.0, 42.3);
        for _ in 0..50 {
            let (fx, fy) = t.forward(lon, lat).unwrap();
            lon += (x - fx) / 82_000.0;
            lat += (y - fy) / 111_000.0;
        }
        (lon, lat)
    }

    pub fn options() -> AnnotateOptions {
        AnnotateOptions {
            step: 25.0,
            surface: RiskSurfaceOptions {
                bandwidth: Bandwidth::Fixed(50.0),
                ..RiskSurfaceOptions::default()
            },
        }
    }

    #[test]
    fn filters_points_by_bucket() {
        let graph = square();
        let points = crimes_near_node_one(&graph);
        let bucket = TimeBucket::from_hour(14).unwrap();
        let active = bucket_points(&points, bucket);
        assert_eq!(active.len(), 4);
        assert!(active.iter().all(|p| p.time_interval == "12-16"));
        assert!(bucket_points(&points, TimeBucket::from_hour(20).unwrap()).is_empty());
    }

    #[test]
    fn scores_every_edge_under_bucket_attribute() {
        let graph = square();
        let points = crimes_near_node_one(&graph);
        let bucket = TimeBucket::from_hour(13).unwrap();
        let annotated =
            annotate_graph(&graph, &points, bucket, &options(), &null_progress()).unwrap();

        assert!(annotated.has_attribute_everywhere("kde_score_for_12_16"));
        let score = |i| {
            annotated
                .edge(EdgeId::new(i))
                .unwrap()
                .attribute_f64("kde_score_for_12_16")
        };
        let near = score(4); // 1 -> 3
        let far = score(6); // 3 -> 4
        assert!(near > far, "{near} vs {far}");
        assert!(annotated.edges().all(|e| {
            let s = e.attribute_f64("kde_score_for_12_16");
            s.is_finite() && s >= 0.0
        }));
    }

    #[test]
    fn rerun_only_touches_its_bucket() {
        let graph = square();
        let points = crimes_near_node_one(&graph);
        let night = TimeBucket::from_hour(2).unwrap();
        let afternoon = TimeBucket::from_hour(14).unwrap();

        let once = annotate_graph(&graph, &points, night, &options(), &null_progress()).unwrap();
        let twice =
            annotate_graph(&once, &points, afternoon, &options(), &null_progress()).unwrap();
        let again =
            annotate_graph(&twice, &points, afternoon, &options(), &null_progress()).unwrap();

        for ((a, b), c) in once.edges().zip(twice.edges()).zip(again.edges()) {
            assert_eq!(
                a.attributes.get("kde_score_for_00_04"),
                b.attributes.get("kde_score_for_00_04")
            );
            assert_eq!(
                b.attributes.get("kde_score_for_00_04"),
                c.attributes.get("kde_score_for_00_04")
            );
            assert_eq!(
                b.attributes.get("kde_score_for_12_16"),
                c.attributes.get("kde_score_for_12_16")
            );
            assert!((a.length - c.length).abs() < f64::EPSILON);
        }
    }

    /// The test square with its nodes in longitude/latitude.
    fn square_lon_lat() -> StreetGraph {
        let utm = square();
        let nodes: BTreeMap<_, _> = utm
            .nodes()
            .map(|(id, n)| {
                let (x, y) = inverse_utm19(n.x, n.y);
                (id, Node { x, y })
            })
            .collect();
        StreetGraph::new("EPSG:4326", nodes, utm.edges().cloned().collect()).unwrap()
    }

    #[test]
    fn lon_lat_graphs_score_in_local_utm_zone() {
        let projected = square();
        let geographic = square_lon_lat();
        assert_eq!(
            scoring_crs(&geographic, Crs::Geographic),
            Crs::Utm {
                zone: 19,
                south: false
            }
        );
        let utm = projected.crs().unwrap();
        assert_eq!(scoring_crs(&projected, utm), utm);

        // A step that does not divide the 100 m edges, so centimeter
        // projection error cannot change the sample count
        let options = AnnotateOptions {
            step: 30.0,
            ..options()
        };
        let points = crimes_near_node_one(&projected);
        let bucket = TimeBucket::from_hour(13).unwrap();
        let a = run_kde_on_graph(&projected, &points, bucket, &options, &null_progress()).unwrap();
        let b =
            run_kde_on_graph(&geographic, &points, bucket, &options, &null_progress()).unwrap();

        assert_eq!(a.values.len(), b.values.len());
        for (id, expected) in &a.values {
            let got = b.values[id];
            assert!(
                (got - expected).abs() <= expected.abs() * 1e-2 + 1e-15,
                "{id}: {got} vs {expected}"
            );
        }
        assert!(b.values[&EdgeId::new(4)] > 0.0);
    }

    #[test]
    fn zero_length_edges_score_zero() {
        let nodes = BTreeMap::from([
            (1, Node { x: 330_000.0, y: 4_690_000.0 }),
            (2, Node { x: 330_000.0, y: 4_690_000.0 }),
        ]);
        let edges = vec![Edge {
            u: 1,
            v: 2,
            key: 0,
            length: 0.0,
            geometry: None,
            attributes: BTreeMap::new(),
        }];
        let graph = StreetGraph::new("EPSG:32619", nodes, edges).unwrap();
        let points = crimes_near_node_one(&square());
        let patch = run_kde_on_graph(
            &graph,
            &points,
            TimeBucket::from_hour(12).unwrap(),
            &options(),
            &null_progress(),
        )
        .unwrap();
        assert_eq!(patch.values.get(&EdgeId::new(0)), Some(&0.0));
    }

    #[test]
    fn empty_bucket_names_the_bucket() {
        let graph = square();
        let points = crimes_near_node_one(&graph);
        let err = run_kde_on_graph(
            &graph,
            &points,
            TimeBucket::from_hour(21).unwrap(),
            &options(),
            &null_progress(),
        )
        .unwrap_err();
        match err {
            GraphError::Annotate { bucket, .. } => assert_eq!(bucket, "20:00-24:00"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unsupported_crs_is_an_error() {
        let nodes = BTreeMap::from([(1, Node { x: 0.0, y: 0.0 })]);
        let graph = StreetGraph::new("EPSG:2249", nodes, Vec::new()).unwrap();
        let err = run_kde_on_graph(
            &graph,
            &[],
            TimeBucket::from_hour(0).unwrap(),
            &options(),
            &null_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::Risk(_)));
    }
}
