//! Loader tests against a stand-in for the Neo4j HTTP API.

use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};
use xml2graph_core::{ConnectionConfig, Error, Schema, load, parse_str};

const SCHEMA: &str = r#"
entities:
  - element: person
    id: { attribute: id }
relationships:
  - element: knows
    source: { attribute: from }
    target: { attribute: to }
"#;

const PEOPLE: &str = r#"<people><person id="1" name="Alice"/><knows from="1" to="2"/></people>"#;

fn graph() -> xml2graph_core::Graph {
    parse_str(PEOPLE, &Schema::from_yaml(SCHEMA).unwrap()).unwrap()
}

fn connection(server: &MockServer) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(server.uri(), "neo4j", "secret");
    config.timeout_secs = 5;
    config
}

fn ok(data: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "results": [{ "columns": [], "data": data }],
        "errors": []
    }))
}

/// Answers an edge upsert as if every endpoint matched.
struct EchoEdges;

impl Respond for EchoEdges {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let data = body["statements"][0]["parameters"]["rows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| json!({ "row": [row["source"], row["target"]] }))
            .collect();
        ok(data)
    }
}

async fn mount_ping(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/db/neo4j/tx/commit"))
        .and(body_string_contains("RETURN 1"))
        .respond_with(ok(vec![json!({ "row": [1] })]))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_load_sends_merge_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/db/neo4j/tx/commit"))
        // neo4j:secret
        .and(header("authorization", "Basic bmVvNGo6c2VjcmV0"))
        .and(body_string_contains("RETURN 1"))
        .respond_with(ok(vec![json!({ "row": [1] })]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("MERGE (n:"))
        .respond_with(ok(vec![]))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("MERGE (a)-[r:`knows`]->(b)"))
        .respond_with(EchoEdges)
        .expect(1)
        .mount(&server)
        .await;

    let stats = load(&graph(), &connection(&server)).await.unwrap();
    assert_eq!((stats.nodes, stats.edges, stats.batches), (2, 1, 3));

    let requests = server.received_requests().await.unwrap();
    let bodies: Vec<Value> = requests
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();

    let person = bodies
        .iter()
        .find(|b| {
            b["statements"][0]["statement"]
                .as_str()
                .is_some_and(|s| s.contains("MERGE (n:`person`"))
        })
        .unwrap();
    let row = &person["statements"][0]["parameters"]["rows"][0];
    assert_eq!(row["id"], json!("1"));
    assert_eq!(row["props"]["name"], json!("Alice"));
    assert_eq!(row["props"]["id"], json!("1"));

    assert!(bodies.iter().any(|b| {
        b["statements"][0]["statement"]
            .as_str()
            .is_some_and(|s| s.contains("MERGE (n:`Node`"))
    }));
}

#[tokio::test]
async fn test_rejected_credentials_are_connection_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = load(&graph(), &connection(&server)).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_security_error_code_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "errors": [{
                "code": "Neo.ClientError.Security.Unauthorized",
                "message": "The client is unauthorized due to authentication failure."
            }]
        })))
        .mount(&server)
        .await;

    let err = load(&graph(), &connection(&server)).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unmatched_edge_endpoint_is_load_error() {
    let server = MockServer::start().await;
    mount_ping(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("MERGE (n:"))
        .respond_with(ok(vec![]))
        .mount(&server)
        .await;
    // Endpoints missing: the MATCH yields no rows
    Mock::given(method("POST"))
        .and(body_string_contains("MERGE (a)-[r:"))
        .respond_with(ok(vec![]))
        .mount(&server)
        .await;

    let err = load(&graph(), &connection(&server)).await.unwrap_err();
    match err {
        Error::Load(message) => assert!(message.contains("1 -[knows]-> 2")),
        other => panic!("expected a load error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_statement_error_is_load_error() {
    let server = MockServer::start().await;
    mount_ping(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("MERGE (n:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "errors": [{
                "code": "Neo.ClientError.Schema.ConstraintValidationFailed",
                "message": "Node already exists with label `person`"
            }]
        })))
        .mount(&server)
        .await;

    let err = load(&graph(), &connection(&server)).await.unwrap_err();
    assert!(matches!(err, Error::Load(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unknown_database_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut config = connection(&server);
    config.database = "missing".to_string();
    let err = load(&graph(), &config).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_server_is_connection_error() {
    // Nothing listens on the discard port
    let mut config = ConnectionConfig::new("http://127.0.0.1:9", "neo4j", "secret");
    config.timeout_secs = 2;

    let err = load(&graph(), &config).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_bolt_url_is_config_error() {
    let config = ConnectionConfig::new("bolt://localhost:7687", "neo4j", "secret");
    let err = load(&graph(), &config).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}
