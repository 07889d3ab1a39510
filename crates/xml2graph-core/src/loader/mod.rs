//! Idempotent graph database loading
//!
//! [`Loader`] turns a [`Graph`] into batched upserts against a
//! [`GraphStore`]. Nodes are matched by label and identifier, edges by
//! `(source, type, target)`, so loading the same graph twice leaves the
//! database unchanged the second time.

pub mod memory;
pub mod neo4j;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::graph::{Graph, GraphNode};

pub use memory::MemoryStore;
pub use neo4j::Neo4jHttpStore;

/// Properties written to a database node or relationship.
pub type Properties = Map<String, JsonValue>;

/// One node to merge.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeRow {
    pub id: String,
    pub props: Properties,
}

/// One relationship to merge between two existing nodes.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EdgeRow {
    pub source: String,
    pub target: String,
    pub props: Properties,
}

/// Relationships sharing endpoint labels and type, upserted together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeGroup {
    pub source_label: String,
    pub label: String,
    pub target_label: String,
}

/// A database that can merge nodes and relationships.
#[async_trait]
pub trait GraphStore: Send {
    /// Acquire the connection and verify credentials.
    async fn connect(&mut self) -> Result<()>;

    /// Match-or-create each row by `label` + id and overwrite its properties.
    async fn upsert_nodes(&mut self, label: &str, rows: &[NodeRow]) -> Result<()>;

    /// Match-or-create one relationship per row. Fails with [`Error::Load`]
    /// if either endpoint is missing.
    async fn upsert_edges(&mut self, group: &EdgeGroup, rows: &[EdgeRow]) -> Result<()>;

    /// Release the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Database connection parameters.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// HTTP(S) base URL of the Neo4j server, e.g. `http://localhost:7474`.
    pub url: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Request timeout, also used for establishing the connection.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Label for nodes that were only referenced by edges.
    #[serde(default = "default_label")]
    pub default_label: String,
    /// Property holding the node identifier.
    #[serde(default = "default_id_property")]
    pub id_property: String,
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    500
}

fn default_label() -> String {
    "Node".to_string()
}

fn default_id_property() -> String {
    "id".to_string()
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
            default_label: default_label(),
            id_property: default_id_property(),
        }
    }

    /// Build from `NEO4J_URL`, `NEO4J_USER`, `NEO4J_PASSWORD` and the optional
    /// `NEO4J_DATABASE`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| Error::Config(format!("{name} is not set")))
        };
        let mut config = Self::new(var("NEO4J_URL")?, var("NEO4J_USER")?, var("NEO4J_PASSWORD")?);
        if let Ok(database) = std::env::var("NEO4J_DATABASE") {
            config.database = database;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid database URL `{}`: {e}", self.url)))?;
        match url.scheme() {
            "http" | "https" => {}
            "bolt" | "bolt+s" | "neo4j" | "neo4j+s" => {
                return Err(Error::Config(format!(
                    "`{}` is a Bolt URL; use the server's HTTP endpoint (e.g. http://host:7474)",
                    self.url
                )));
            }
            other => {
                return Err(Error::Config(format!("unsupported URL scheme `{other}`")));
            }
        }
        if self.database.is_empty() {
            return Err(Error::Config("database name is empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout must be at least one second".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".to_string()));
        }
        if self.default_label.is_empty() || self.id_property.is_empty() {
            return Err(Error::Config(
                "default label and id property must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Transactional Cypher endpoint for the configured database.
    pub fn commit_endpoint(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.url.trim_end_matches('/'),
            self.database
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("timeout_secs", &self.timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("default_label", &self.default_label)
            .field("id_property", &self.id_property)
            .finish()
    }
}

/// Loader settings independent of the store.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub default_label: String,
    pub id_property: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            default_label: default_label(),
            id_property: default_id_property(),
        }
    }
}

impl From<&ConnectionConfig> for LoadOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            default_label: config.default_label.clone(),
            id_property: config.id_property.clone(),
        }
    }
}

/// Counts reported after a load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub nodes: usize,
    pub edges: usize,
    pub batches: usize,
}

/// Load `graph` into the Neo4j server described by `connection`.
pub async fn load(graph: &Graph, connection: &ConnectionConfig) -> Result<LoadStats> {
    let store = Neo4jHttpStore::new(connection.clone())?;
    Loader::new(store, LoadOptions::from(connection))
        .load(graph)
        .await
}

/// Upserts a graph into a [`GraphStore`].
pub struct Loader<S> {
    store: S,
    options: LoadOptions,
}

impl<S: GraphStore> Loader<S> {
    pub fn new(store: S, options: LoadOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Connect, upsert every node then every edge, and release the
    /// connection whether or not the upserts succeeded.
    pub async fn load(&mut self, graph: &Graph) -> Result<LoadStats> {
        if self.options.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".to_string()));
        }

        self.store.connect().await?;
        let outcome = self.upsert(graph).await;
        let closed = self.store.close().await;

        let stats = outcome?;
        closed?;
        info!(
            nodes = stats.nodes,
            edges = stats.edges,
            batches = stats.batches,
            "loaded graph"
        );
        Ok(stats)
    }

    async fn upsert(&mut self, graph: &Graph) -> Result<LoadStats> {
        let mut stats = LoadStats::default();
        let LoadOptions {
            batch_size,
            default_label,
            id_property,
        } = self.options.clone();

        let mut labels: IndexMap<&str, &str> = IndexMap::with_capacity(graph.node_count());
        let mut node_groups: IndexMap<&str, Vec<NodeRow>> = IndexMap::new();
        for node in graph.nodes() {
            let label = node_label(node, &default_label)?;
            labels.insert(&node.id, label);
            node_groups
                .entry(label)
                .or_default()
                .push(node_row(node, &id_property)?);
        }

        let mut edge_groups: IndexMap<EdgeGroup, Vec<EdgeRow>> = IndexMap::new();
        for edge in graph.edges() {
            let endpoint_label = |id: &str| {
                labels.get(id).copied().ok_or_else(|| {
                    Error::Load(format!(
                        "edge {} -[{}]-> {} references unknown node `{id}`",
                        edge.source, edge.label, edge.target
                    ))
                })
            };
            if edge.label.is_empty() {
                return Err(Error::Load(format!(
                    "edge {} -> {} has an empty label",
                    edge.source, edge.target
                )));
            }
            let group = EdgeGroup {
                source_label: endpoint_label(&edge.source)?.to_string(),
                label: edge.label.clone(),
                target_label: endpoint_label(&edge.target)?.to_string(),
            };
            edge_groups.entry(group).or_default().push(EdgeRow {
                source: edge.source.clone(),
                target: edge.target.clone(),
                props: properties(&edge.attributes, &edge.source)?,
            });
        }

        for (label, rows) in &node_groups {
            for batch in rows.chunks(batch_size) {
                debug!(label, rows = batch.len(), "upserting nodes");
                self.store.upsert_nodes(label, batch).await?;
                stats.nodes += batch.len();
                stats.batches += 1;
            }
        }

        for (group, rows) in &edge_groups {
            for batch in rows.chunks(batch_size) {
                debug!(label = %group.label, rows = batch.len(), "upserting edges");
                self.store.upsert_edges(group, batch).await?;
                stats.edges += batch.len();
                stats.batches += 1;
            }
        }

        Ok(stats)
    }
}

fn node_label<'a>(node: &'a GraphNode, default_label: &'a str) -> Result<&'a str> {
    match node.label.as_deref() {
        Some("") => Err(Error::Load(format!("node `{}` has an empty label", node.id))),
        Some(label) => Ok(label),
        None => Ok(default_label),
    }
}

fn node_row(node: &GraphNode, id_property: &str) -> Result<NodeRow> {
    let mut props = properties(&node.attributes, &node.id)?;
    if props.contains_key(id_property) {
        warn!(
            node = %node.id,
            property = %id_property,
            "attribute shadowed by the node identifier"
        );
    }
    props.insert(id_property.to_string(), JsonValue::String(node.id.clone()));
    Ok(NodeRow {
        id: node.id.clone(),
        props,
    })
}

/// Copy attributes into database properties, refusing values the database
/// cannot store as a single property.
fn properties(attributes: &crate::graph::Attributes, owner: &str) -> Result<Properties> {
    let mut props = Properties::new();
    for (name, value) in attributes {
        match value {
            JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) => {
                props.insert(name.clone(), value.clone());
            }
            other => {
                return Err(Error::Load(format!(
                    "attribute `{name}` of `{owner}` cannot be stored as a property: {other}"
                )));
            }
        }
    }
    Ok(props)
}

/// Quote a label or relationship type for use in Cypher.
pub(crate) fn cypher_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
