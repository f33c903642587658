//! Street graph storage.
//!
//! A [`StreetGraph`] wraps a petgraph [`StableDiGraph`]: node weights are
//! positions, edge weights carry length, geometry and attributes. Stable
//! indices never shift, so an [`EdgeId`] keeps naming the same edge across
//! patches. Several edges may join the same pair of nodes; `key` tells
//! them apart. Graphs are values: stages never mutate a shared graph, they
//! produce an [`EdgePatch`] which is applied to yield a new graph.

use std::collections::BTreeMap;

use crime_route_risk::{Crs, CrsError};
use geo::{Coord, LineString};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::GraphError;
use crate::coerce::coerce_attr;

/// Node identifier.
pub type NodeId = i64;

/// Attribute names that may not be written by a patch because they are
/// structural edge fields.
pub const RESERVED_ATTRIBUTES: [&str; 5] = ["length", "geometry", "u", "v", "key"];

/// Stable edge identifier: the edge's index in the underlying graph,
/// which follows the order edges were listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(EdgeIndex);

impl EdgeId {
    /// The `index`-th edge.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(EdgeIndex::new(index))
    }

    /// Position of the edge in listing order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0.index()
    }

    /// The petgraph index, for walking [`StreetGraph::network`].
    #[must_use]
    pub const fn edge_index(self) -> EdgeIndex {
        self.0
    }
}

impl From<EdgeIndex> for EdgeId {
    fn from(index: EdgeIndex) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index())
    }
}

/// A graph node in the graph's CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Easting, or longitude for geographic graphs.
    pub x: f64,
    /// Northing, or latitude for geographic graphs.
    pub y: f64,
}

/// A persisted edge attribute. Exports may store numbers as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Numeric value.
    Number(f64),
    /// Text value, possibly a number in disguise.
    Text(String),
    /// Explicit null.
    Null,
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// A directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node.
    pub u: NodeId,
    /// Target node.
    pub v: NodeId,
    /// Distinguishes parallel edges between `u` and `v`.
    #[serde(default)]
    pub key: u32,
    /// Physical length in map units. Text lengths are coerced like any
    /// other attribute.
    #[serde(deserialize_with = "lenient_length")]
    pub length: f64,
    /// Polyline in the graph's CRS. A straight segment between the end
    /// nodes when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<[f64; 2]>>,
    /// Everything else: risk scores, risk cost, OSM tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
}

fn lenient_length<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    AttrValue::deserialize(deserializer).map(|value| coerce_attr(&value))
}

impl Edge {
    /// Numeric value of an attribute, coerced from text and defaulting to
    /// `0.0` when missing or unparseable.
    #[must_use]
    pub fn attribute_f64(&self, name: &str) -> f64 {
        self.attributes.get(name).map_or(0.0, coerce_attr)
    }

    /// Whether the edge carries `name`.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// New values for one edge attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePatch {
    /// Attribute written by the patch.
    pub attribute: String,
    /// New value per edge. Edges not listed are left untouched.
    pub values: BTreeMap<EdgeId, f64>,
}

impl EdgePatch {
    /// An empty patch for `attribute`.
    #[must_use]
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            values: BTreeMap::new(),
        }
    }
}

/// The persisted form: nodes keyed by id, edges in id order.
#[derive(Debug, Deserialize)]
pub struct GraphDocument {
    /// CRS identifier, e.g. `EPSG:32619` or a proj string.
    pub crs: String,
    /// Node positions by id.
    pub nodes: BTreeMap<NodeId, Node>,
    /// Edges; their position becomes their [`EdgeId`].
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Serialize)]
struct GraphDocumentRef<'a> {
    crs: &'a str,
    nodes: BTreeMap<NodeId, &'a Node>,
    edges: Vec<&'a Edge>,
}

impl TryFrom<GraphDocument> for StreetGraph {
    type Error = GraphError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        Self::new(doc.crs, doc.nodes, doc.edges)
    }
}

/// A directed street multigraph.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "GraphDocument")]
pub struct StreetGraph {
    crs: String,
    network: StableDiGraph<Node, Edge>,
    index: BTreeMap<NodeId, NodeIndex>,
}

impl StreetGraph {
    /// Builds a graph. Edge ids follow the order of `edges`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] for the first edge that joins
    /// a node missing from `nodes`.
    pub fn new(
        crs: impl Into<String>,
        nodes: BTreeMap<NodeId, Node>,
        edges: Vec<Edge>,
    ) -> Result<Self, GraphError> {
        let mut network = StableDiGraph::with_capacity(nodes.len(), edges.len());
        let index: BTreeMap<NodeId, NodeIndex> = nodes
            .into_iter()
            .map(|(id, node)| (id, network.add_node(node)))
            .collect();

        for (idx, edge) in edges.into_iter().enumerate() {
            let endpoint = |node: NodeId| {
                index.get(&node).copied().ok_or(GraphError::UnknownNode {
                    node,
                    edge: EdgeId::new(idx),
                })
            };
            let (u, v) = (endpoint(edge.u)?, endpoint(edge.v)?);
            network.add_edge(u, v, edge);
        }

        Ok(Self {
            crs: crs.into(),
            network,
            index,
        })
    }

    /// The CRS identifier as recorded.
    #[must_use]
    pub fn crs_name(&self) -> &str {
        &self.crs
    }

    /// The parsed CRS.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::Unsupported`] if the recorded CRS is not one
    /// this crate can project into.
    pub fn crs(&self) -> Result<Crs, CrsError> {
        self.crs.parse()
    }

    /// The underlying petgraph graph. Edge weights carry their own `u`
    /// and `v` ids.
    #[must_use]
    pub const fn network(&self) -> &StableDiGraph<Node, Edge> {
        &self.network
    }

    /// Petgraph index of a node.
    #[must_use]
    pub fn node_index(&self, id: NodeId) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.network.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.network.edge_count()
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.index
            .iter()
            .map(|(id, ix)| (*id, &self.network[*ix]))
    }

    /// One node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.network.node_weight(self.node_index(id)?)
    }

    /// All edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges_with_ids().map(|(_, edge)| edge)
    }

    /// One edge.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.network.edge_weight(id.0)
    }

    /// Edges with their ids.
    pub fn edges_with_ids(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.network
            .edge_indices()
            .map(|ix| (EdgeId(ix), &self.network[ix]))
    }

    /// The edge's polyline: its geometry, or the straight segment between
    /// its end nodes.
    #[must_use]
    pub fn edge_line(&self, id: EdgeId) -> Option<LineString<f64>> {
        let edge = self.edge(id)?;
        if let Some(coords) = edge.geometry.as_ref().filter(|g| g.len() >= 2) {
            return Some(LineString::from(coords.clone()));
        }
        let u = self.node(edge.u)?;
        let v = self.node(edge.v)?;
        Some(LineString::new(vec![
            Coord { x: u.x, y: u.y },
            Coord { x: v.x, y: v.y },
        ]))
    }

    /// Whether every edge carries `attribute`. False for an edgeless
    /// graph.
    #[must_use]
    pub fn has_attribute_everywhere(&self, attribute: &str) -> bool {
        self.edge_count() > 0 && self.edges().all(|e| e.has_attribute(attribute))
    }

    /// Returns a copy of the graph with `patch` applied.
    ///
    /// # Errors
    ///
    /// See [`Self::into_patched`].
    pub fn with_patch(&self, patch: &EdgePatch) -> Result<Self, GraphError> {
        self.clone().into_patched(patch)
    }

    /// Applies `patch`, consuming the graph.
    ///
    /// # Errors
    ///
    /// * [`GraphError::ReservedAttribute`] if the patch targets a
    ///   structural field such as `length`.
    /// * [`GraphError::UnknownEdge`] if the patch names a missing edge.
    pub fn into_patched(mut self, patch: &EdgePatch) -> Result<Self, GraphError> {
        if RESERVED_ATTRIBUTES.contains(&patch.attribute.as_str()) {
            return Err(GraphError::ReservedAttribute(patch.attribute.clone()));
        }

        for (id, value) in &patch.values {
            let edge = self
                .network
                .edge_weight_mut(id.0)
                .ok_or(GraphError::UnknownEdge(*id))?;
            edge.attributes
                .insert(patch.attribute.clone(), AttrValue::Number(*value));
        }
        Ok(self)
    }
}

impl PartialEq for StreetGraph {
    fn eq(&self, other: &Self) -> bool {
        self.crs == other.crs
            && self.nodes().eq(other.nodes())
            && self.edges().eq(other.edges())
    }
}

impl Serialize for StreetGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        GraphDocumentRef {
            crs: &self.crs,
            nodes: self.nodes().collect(),
            edges: self.edges().collect(),
        }
        .serialize(serializer)
    }
}
