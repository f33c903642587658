//! Nearest graph node lookup.

use crime_route_graph::{NodeId, StreetGraph};
use rstar::RTree;
use rstar::primitives::GeomWithData;

type IndexedNode = GeomWithData<[f64; 2], NodeId>;

/// R-tree over graph node coordinates.
#[derive(Debug, Clone)]
pub struct NodeLocator {
    tree: RTree<IndexedNode>,
}

impl NodeLocator {
    /// Indexes every node of `graph`.
    #[must_use]
    pub fn new(graph: &StreetGraph) -> Self {
        let entries = graph
            .nodes()
            .filter(|(_, n)| n.x.is_finite() && n.y.is_finite())
            .map(|(id, n)| IndexedNode::new([n.x, n.y], id))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// The node closest to `(x, y)` by planar Euclidean distance, in the
    /// graph's CRS.
    #[must_use]
    pub fn nearest(&self, x: f64, y: f64) -> Option<NodeId> {
        self.tree.nearest_neighbor(&[x, y]).map(|entry| entry.data)
    }

    /// Number of indexed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether no node is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
