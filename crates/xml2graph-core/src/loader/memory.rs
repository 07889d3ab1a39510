//! In-memory graph store
//!
//! Applies the same match-or-create rules as a real database. Used for dry
//! runs and tests.

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{EdgeGroup, EdgeRow, GraphStore, NodeRow, Properties};
use crate::error::{Error, Result};

type NodeKey = (String, String);
type EdgeKey = (NodeKey, String, NodeKey);

#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: IndexMap<NodeKey, Properties>,
    edges: IndexMap<EdgeKey, Properties>,
    connected: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Properties of the node with `label` and `id`.
    pub fn node(&self, label: &str, id: &str) -> Option<&Properties> {
        self.nodes.get(&(label.to_string(), id.to_string()))
    }

    /// Properties of the `label` relationship between two nodes, looked up by id.
    pub fn edge(&self, source: &str, label: &str, target: &str) -> Option<&Properties> {
        self.edges
            .iter()
            .find(|(((_, s), l, (_, t)), _)| s == source && l == label && t == target)
            .map(|(_, props)| props)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::Connection("store is not connected".to_string()))
        }
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn upsert_nodes(&mut self, label: &str, rows: &[NodeRow]) -> Result<()> {
        self.ensure_connected()?;
        for row in rows {
            let props = self
                .nodes
                .entry((label.to_string(), row.id.clone()))
                .or_default();
            props.extend(row.props.clone());
        }
        Ok(())
    }

    async fn upsert_edges(&mut self, group: &EdgeGroup, rows: &[EdgeRow]) -> Result<()> {
        self.ensure_connected()?;

        // Whole batch fails before anything is written, like a transaction
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let source = (group.source_label.clone(), row.source.clone());
            let target = (group.target_label.clone(), row.target.clone());
            for endpoint in [&source, &target] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(Error::Load(format!(
                        "edge {} -[{}]-> {}: no `{}` node with id `{}`",
                        row.source, group.label, row.target, endpoint.0, endpoint.1
                    )));
                }
            }
            keys.push((source, group.label.clone(), target));
        }

        for (key, row) in keys.into_iter().zip(rows) {
            self.edges.entry(key).or_default().extend(row.props.clone());
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}
