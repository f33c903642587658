//! A* shortest paths over a street multigraph.
//!
//! The search is petgraph's [`astar`] over node indices. The graph may
//! hold several edges between the same two nodes, so each hop of the
//! result is resolved to its cheapest edge under the same weight; the
//! path's edges can then be scored afterwards.

use crime_route_graph::{Edge, EdgeId, NodeId, StreetGraph};
use petgraph::algo::astar;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::RouteError;

/// Edge weight to minimize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight<'a> {
    /// Physical edge length.
    Length,
    /// A numeric edge attribute such as `risk_cost`. Edges lacking it
    /// fall back to their length.
    Attribute(&'a str),
}

impl Weight<'_> {
    /// Cost of traversing `edge`, never negative.
    #[must_use]
    pub fn cost(&self, edge: &Edge) -> f64 {
        let cost = match self {
            Self::Length => edge.length,
            Self::Attribute(name) if edge.has_attribute(name) => edge.attribute_f64(name),
            Self::Attribute(_) => edge.length,
        };
        if cost.is_finite() { cost.max(0.0) } else { 0.0 }
    }
}

/// Remaining-cost estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    /// Straight-line distance to the target in planar map units.
    /// Admissible when every edge weight is at least its chord length.
    Euclidean,
    /// No estimate: uniform-cost search.
    None,
}

/// A path found by [`astar_path`].
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Nodes from source to target inclusive.
    pub nodes: Vec<NodeId>,
    /// Edges taken, one fewer than `nodes`.
    pub edges: Vec<EdgeId>,
    /// Total weight.
    pub cost: f64,
}

/// Finds the minimum-weight path from `source` to `target`.
///
/// # Errors
///
/// * [`RouteError::UnknownNode`] if either endpoint is not in the graph.
/// * [`RouteError::NoPath`] if `target` is unreachable.
pub fn astar_path(
    graph: &StreetGraph,
    source: NodeId,
    target: NodeId,
    weight: Weight<'_>,
    heuristic: Heuristic,
) -> Result<Path, RouteError> {
    let start = graph
        .node_index(source)
        .ok_or(RouteError::UnknownNode(source))?;
    let goal = graph
        .node_index(target)
        .ok_or(RouteError::UnknownNode(target))?;

    let network = graph.network();
    let goal_at = network[goal];
    let estimate = |n: NodeIndex| match heuristic {
        Heuristic::Euclidean => {
            let at = network[n];
            (at.x - goal_at.x).hypot(at.y - goal_at.y)
        }
        Heuristic::None => 0.0,
    };

    let (cost, hops) = astar(
        network,
        start,
        |n| n == goal,
        |e| weight.cost(e.weight()),
        estimate,
    )
    .ok_or(RouteError::NoPath {
        from: source,
        to: target,
    })?;

    let edges: Vec<EdgeId> = hops
        .windows(2)
        .filter_map(|hop| cheapest_edge(graph, hop[0], hop[1], weight))
        .collect();
    let mut nodes = Vec::with_capacity(edges.len() + 1);
    nodes.push(source);
    nodes.extend(edges.iter().filter_map(|id| graph.edge(*id)).map(|e| e.v));

    log::debug!(
        "A* {source} -> {target}: {} edges, cost {cost:.1}",
        edges.len()
    );
    Ok(Path { nodes, edges, cost })
}

/// The lowest-weight edge from `from` to `to`.
fn cheapest_edge(
    graph: &StreetGraph,
    from: NodeIndex,
    to: NodeIndex,
    weight: Weight<'_>,
) -> Option<EdgeId> {
    graph
        .network()
        .edges(from)
        .filter(|e| e.target() == to)
        .min_by(|a, b| weight.cost(a.weight()).total_cmp(&weight.cost(b.weight())))
        .map(|e| EdgeId::from(e.id()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crime_route_graph::{AttrValue, Node};

    use super::*;
    use crate::tests::{grid, path_length};

    #[test]
    fn shortest_path_takes_diagonals() {
        let graph = grid();
        let path = astar_path(&graph, 0, 8, Weight::Length, Heuristic::Euclidean).unwrap();
        assert_eq!(path.nodes, vec![0, 4, 8]);
        assert_eq!(path.edges.len(), 2);
        assert!((path.cost - 2.0 * 141.5).abs() < 1e-9);
    }

    #[test]
    fn risk_weight_avoids_center() {
        let graph = grid();
        let path = astar_path(
            &graph,
            0,
            8,
            Weight::Attribute("risk_cost"),
            Heuristic::Euclidean,
        )
        .unwrap();
        assert!(!path.nodes.contains(&4), "{:?}", path.nodes);
        assert_eq!(path.nodes.len(), 5);
        assert!((path.cost - 400.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_cost_matches_astar() {
        let graph = grid();
        for (from, to) in [(0, 8), (2, 6), (3, 5), (7, 1)] {
            for weight in [Weight::Length, Weight::Attribute("risk_cost")] {
                let a = astar_path(&graph, from, to, weight, Heuristic::Euclidean).unwrap();
                let b = astar_path(&graph, from, to, weight, Heuristic::None).unwrap();
                assert!((a.cost - b.cost).abs() < 1e-9, "{from}->{to}");

                let summed: f64 = a
                    .edges
                    .iter()
                    .map(|id| weight.cost(graph.edge(*id).unwrap()))
                    .sum();
                assert!((summed - a.cost).abs() < 1e-9, "{from}->{to}");
                for (hop, id) in a.nodes.windows(2).zip(&a.edges) {
                    let edge = graph.edge(*id).unwrap();
                    assert_eq!((edge.u, edge.v), (hop[0], hop[1]));
                }
            }
        }
    }

    #[test]
    fn picks_cheapest_parallel_edge() {
        let graph = grid();
        let path = astar_path(&graph, 1, 2, Weight::Length, Heuristic::Euclidean).unwrap();
        assert_eq!(path.edges.len(), 1);
        assert!((graph.edge(path.edges[0]).unwrap().length - 100.0).abs() < 1e-9);
        assert!((path_length(&graph, &path) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn parallel_edge_choice_follows_weight() {
        let nodes = BTreeMap::from([
            (1, Node { x: 0.0, y: 0.0 }),
            (2, Node { x: 100.0, y: 0.0 }),
        ]);
        let edge = |key, length, risk_cost: f64| Edge {
            u: 1,
            v: 2,
            key,
            length,
            geometry: None,
            attributes: BTreeMap::from([("risk_cost".to_string(), AttrValue::from(risk_cost))]),
        };
        let edges = vec![edge(0, 100.0, 500.0), edge(1, 120.0, 120.0)];
        let graph = StreetGraph::new("EPSG:32619", nodes, edges).unwrap();

        let fast = astar_path(&graph, 1, 2, Weight::Length, Heuristic::Euclidean).unwrap();
        assert_eq!(fast.edges, vec![EdgeId::new(0)]);
        assert!((fast.cost - 100.0).abs() < 1e-9);

        let safe = astar_path(
            &graph,
            1,
            2,
            Weight::Attribute("risk_cost"),
            Heuristic::Euclidean,
        )
        .unwrap();
        assert_eq!(safe.edges, vec![EdgeId::new(1)]);
        assert_eq!(safe.nodes, vec![1, 2]);
        assert!((safe.cost - 120.0).abs() < 1e-9);
    }

    #[test]
    fn same_node_is_empty_path() {
        let graph = grid();
        let path = astar_path(&graph, 3, 3, Weight::Length, Heuristic::None).unwrap();
        assert_eq!(path.nodes, vec![3]);
        assert!(path.edges.is_empty());
        assert!(path.cost.abs() < f64::EPSILON);
    }

    #[test]
    fn unreachable_and_unknown_nodes() {
        let graph = grid();
        assert!(matches!(
            astar_path(&graph, 0, 9, Weight::Length, Heuristic::None),
            Err(RouteError::NoPath { from: 0, to: 9 })
        ));
        assert!(matches!(
            astar_path(&graph, 0, 42, Weight::Length, Heuristic::None),
            Err(RouteError::UnknownNode(42))
        ));
    }
}
