//! Property graph construction

use std::collections::HashMap;

use indexmap::IndexMap;

pub use crate::types::{Attributes, Graph, GraphEdge, GraphNode};

/// Builds a [`Graph`] while keeping every edge endpoint resolvable.
///
/// Nodes declared twice keep the last declaration. Edges referencing an id
/// that has not been declared (yet, or ever) get a placeholder node, which a
/// later declaration fills in. A repeated `(source, target, label)` triple
/// updates the existing edge instead of adding a parallel one.
pub struct GraphBuilder {
    nodes: IndexMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<(String, String, String), usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
        }
    }

    /// Declare a node, replacing the label and attributes of any earlier
    /// node with the same id.
    pub fn upsert_node(&mut self, id: &str, label: Option<String>, attributes: Attributes) {
        let entry = self
            .nodes
            .entry(id.to_string())
            .or_insert_with(|| GraphNode::new(id.to_string()));
        entry.label = label;
        entry.attributes = attributes;
    }

    /// Set a single attribute on an existing node.
    ///
    /// Returns `false` if the node is unknown.
    pub fn set_node_attribute(&mut self, id: &str, name: &str, value: serde_json::Value) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.attributes.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn add_edge(&mut self, source: &str, target: &str, label: &str, attributes: Attributes) {
        self.ensure_node(source);
        self.ensure_node(target);

        let key = (source.to_string(), target.to_string(), label.to_string());
        if let Some(&idx) = self.edge_index.get(&key) {
            self.edges[idx].attributes = attributes;
            return;
        }

        self.edge_index.insert(key, self.edges.len());
        self.edges.push(GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            label: label.to_string(),
            attributes,
        });
    }

    fn ensure_node(&mut self, id: &str) {
        if !self.nodes.contains_key(id) {
            self.nodes
                .insert(id.to_string(), GraphNode::new(id.to_string()));
        }
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn into_graph(self) -> Graph {
        Graph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
