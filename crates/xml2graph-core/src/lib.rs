//! # xml2graph-core
//!
//! Core library for turning XML documents into property graphs.
//!
//! This library provides:
//! - Schema-driven mapping of XML elements to nodes and edges
//! - GEXF 1.2 and GraphML export (with readers for verification)
//! - Idempotent loading into Neo4j over its HTTP API
//!
//! ## Example
//!
//! ```no_run
//! use xml2graph_core::{ConnectionConfig, Schema, export, load, parse};
//!
//! # async fn example() -> xml2graph_core::Result<()> {
//! let schema = Schema::from_file("people.schema.yaml")?;
//! let graph = parse("people.xml", &schema)?;
//!
//! export(&graph, "people.gexf", "people.graphml")?;
//!
//! let connection = ConnectionConfig::new("http://localhost:7474", "neo4j", "secret");
//! let stats = load(&graph, &connection).await?;
//! println!("{} nodes, {} edges", stats.nodes, stats.edges);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod loader;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod types;

// Re-export commonly used types
pub use types::{Attributes, Graph, GraphEdge, GraphNode};

pub use config::{ExportConfig, PipelineConfig, SchemaSource};
pub use error::{Error, Result};
pub use export::{Exporter, export, read_gexf, read_graphml};
pub use graph::GraphBuilder;
pub use loader::{
    ConnectionConfig, GraphStore, LoadOptions, LoadStats, Loader, MemoryStore, Neo4jHttpStore,
    load,
};
pub use parser::{parse, parse_str};
pub use pipeline::{Pipeline, PipelineReport};
pub use schema::Schema;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &str = r#"
entities:
  - element: person
    id: { attribute: id }
relationships:
  - element: knows
    source: { attribute: from }
    target: { attribute: to }
"#;

    #[test]
    fn test_node_creation() {
        let mut node = GraphNode::new("n1".to_string());
        assert!(node.is_placeholder());

        node.label = Some("person".to_string());
        node.attributes.insert("name".to_string(), json!("Alice"));
        assert!(!node.is_placeholder());
        assert_eq!(node.attributes["name"], json!("Alice"));
    }

    #[test]
    fn test_graph_serialization() {
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let graph = parse_str(r#"<r><person id="1"/><knows from="1" to="2"/></r>"#, &schema)
            .unwrap();

        let value = serde_json::to_value(&graph).unwrap();
        assert_eq!(value["edges"][0]["label"], json!("knows"));
        assert_eq!(value["nodes"]["1"]["label"], json!("person"));
    }

    #[tokio::test]
    async fn test_parse_then_load_in_memory() {
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let graph = parse_str(
            r#"<people><person id="1"/><knows from="1" to="2"/></people>"#,
            &schema,
        )
        .unwrap();

        let mut loader = Loader::new(MemoryStore::new(), LoadOptions::default());
        let stats = loader.load(&graph).await.unwrap();
        assert_eq!(stats, LoadStats { nodes: 2, edges: 1, batches: 3 });
    }
}
