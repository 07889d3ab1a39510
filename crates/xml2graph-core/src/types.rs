//! Common types used across xml2graph

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Attribute name to scalar value. Insertion order follows the source document.
pub type Attributes = IndexMap<String, JsonValue>;

/// A node in the property graph
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: Attributes,
}

/// A directed, labelled edge between two nodes
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub label: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: Attributes,
}

/// A complete property graph produced from one document.
///
/// Nodes are keyed by id. Every edge endpoint is present in `nodes`; the
/// only way to build a `Graph` is through [`crate::GraphBuilder`], which
/// maintains that invariant.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct Graph {
    pub(crate) nodes: IndexMap<String, GraphNode>,
    pub(crate) edges: Vec<GraphEdge>,
}

impl GraphNode {
    pub fn new(id: String) -> Self {
        Self {
            id,
            label: None,
            attributes: Attributes::new(),
        }
    }

    /// True when the node was only ever referenced by an edge.
    pub fn is_placeholder(&self) -> bool {
        self.label.is_none() && self.attributes.is_empty()
    }
}

impl GraphEdge {
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.source, &self.target, &self.label)
    }
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl ExactSizeIterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Position of a node in insertion order.
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.get_index_of(id)
    }
}
