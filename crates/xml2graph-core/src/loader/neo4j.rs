//! Neo4j store over the HTTP transactional Cypher API
//!
//! Each batch is one `tx/commit` request, so a batch either applies fully or
//! not at all. Earlier batches stay committed when a later one fails.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use super::{ConnectionConfig, EdgeGroup, EdgeRow, GraphStore, NodeRow, cypher_identifier};
use crate::error::{Error, Result};

/// [`GraphStore`] backed by a Neo4j server's HTTP endpoint.
pub struct Neo4jHttpStore {
    config: ConnectionConfig,
    endpoint: String,
    client: Option<Client>,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<JsonValue>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl Neo4jHttpStore {
    /// Create a store for `config`. No request is made until [`GraphStore::connect`].
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.commit_endpoint();
        Ok(Self {
            config,
            endpoint,
            client: None,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn run(&self, statement: String, parameters: JsonValue) -> Result<Vec<TxResult>> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Connection("store is not connected".to_string()))?;

        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });
        let response = client
            .post(&self.endpoint)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("{}: {e}", self.config.url)))?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::Connection(format!(
                    "credentials for `{}` rejected ({status})",
                    self.config.user
                )));
            }
            StatusCode::NOT_FOUND => {
                return Err(Error::Connection(format!(
                    "no database `{}` at {}",
                    self.config.database, self.config.url
                )));
            }
            s if s.is_server_error() => {
                return Err(Error::Connection(format!("{} answered {status}", self.config.url)));
            }
            s if !s.is_success() => {
                return Err(Error::Load(format!("{} answered {status}", self.config.url)));
            }
            _ => {}
        }

        let body: TxResponse = response
            .json()
            .await
            .map_err(|e| Error::Load(format!("unreadable response from {}: {e}", self.config.url)))?;

        if let Some(error) = body.errors.into_iter().next() {
            return Err(classify(error));
        }
        Ok(body.results)
    }
}

fn classify(error: TxError) -> Error {
    let message = format!("{}: {}", error.code, error.message);
    if error.code.starts_with("Neo.ClientError.Security.")
        || error.code == "Neo.ClientError.Database.DatabaseNotFound"
    {
        Error::Connection(message)
    } else {
        Error::Load(message)
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn connect(&mut self) -> Result<()> {
        let client = Client::builder()
            .timeout(self.config.timeout())
            .connect_timeout(self.config.timeout())
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        self.client = Some(client);

        if let Err(e) = self.run("RETURN 1".to_string(), json!({})).await {
            self.client = None;
            return Err(e);
        }
        debug!(endpoint = %self.endpoint, "connected");
        Ok(())
    }

    async fn upsert_nodes(&mut self, label: &str, rows: &[NodeRow]) -> Result<()> {
        let statement = format!(
            "UNWIND $rows AS row MERGE (n:{} {{{}: row.id}}) SET n += row.props",
            cypher_identifier(label),
            cypher_identifier(&self.config.id_property),
        );
        self.run(statement, json!({ "rows": rows })).await?;
        Ok(())
    }

    async fn upsert_edges(&mut self, group: &EdgeGroup, rows: &[EdgeRow]) -> Result<()> {
        let id = cypher_identifier(&self.config.id_property);
        let statement = format!(
            "UNWIND $rows AS row \
             MATCH (a:{source} {{{id}: row.source}}) \
             MATCH (b:{target} {{{id}: row.target}}) \
             MERGE (a)-[r:{rel}]->(b) SET r += row.props \
             RETURN row.source AS source, row.target AS target",
            source = cypher_identifier(&group.source_label),
            target = cypher_identifier(&group.target_label),
            rel = cypher_identifier(&group.label),
        );
        let results = self.run(statement, json!({ "rows": rows })).await?;

        let merged: HashSet<(String, String)> = results
            .into_iter()
            .flat_map(|result| result.data)
            .filter_map(|data| match data.row.as_slice() {
                [JsonValue::String(s), JsonValue::String(t)] => Some((s.clone(), t.clone())),
                _ => None,
            })
            .collect();

        // MATCH drops rows whose endpoints are absent instead of failing
        if let Some(missing) = rows
            .iter()
            .find(|row| !merged.contains(&(row.source.clone(), row.target.clone())))
        {
            return Err(Error::Load(format!(
                "edge {} -[{}]-> {}: endpoint not found in database",
                missing.source, group.label, missing.target
            )));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // HTTP requests are stateless; dropping the client releases pooled sockets
        if self.client.take().is_some() {
            debug!(endpoint = %self.endpoint, "connection released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bolt_url() {
        let config = ConnectionConfig::new("neo4j://localhost:7687", "neo4j", "pw");
        assert!(matches!(Neo4jHttpStore::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint() {
        let config = ConnectionConfig::new("https://graph.example.org", "neo4j", "pw");
        let store = Neo4jHttpStore::new(config).unwrap();
        assert_eq!(
            store.endpoint(),
            "https://graph.example.org/db/neo4j/tx/commit"
        );
    }

    #[test]
    fn test_classify_security_errors() {
        let auth = classify(TxError {
            code: "Neo.ClientError.Security.Unauthorized".to_string(),
            message: "bad credentials".to_string(),
        });
        assert!(matches!(auth, Error::Connection(_)));

        let constraint = classify(TxError {
            code: "Neo.ClientError.Schema.ConstraintValidationFailed".to_string(),
            message: "already exists".to_string(),
        });
        assert!(matches!(constraint, Error::Load(_)));
    }

    #[tokio::test]
    async fn test_upsert_without_connect_fails() {
        let config = ConnectionConfig::new("http://localhost:7474", "neo4j", "pw");
        let mut store = Neo4jHttpStore::new(config).unwrap();
        let err = store.upsert_nodes("person", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
