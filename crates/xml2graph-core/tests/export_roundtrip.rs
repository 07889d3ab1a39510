//! End-to-end tests: parse fixtures, export to disk, read the files back.

use std::collections::HashSet;
use std::path::PathBuf;

use serde_json::json;
use xml2graph_core::{
    Error, Exporter, LoadOptions, Loader, MemoryStore, Schema, export, parse, parse_str,
    read_gexf, read_graphml,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn uniprot() -> xml2graph_core::Graph {
    let schema = Schema::from_file(fixture("uniprot.schema.yaml")).unwrap();
    parse(fixture("uniprot_sample.xml"), &schema).unwrap()
}

#[test]
fn test_uniprot_sample_shape() {
    let graph = uniprot();

    // 1 protein, 2 accessions, 3 names, gene, organism, taxonomy reference,
    // 2 references, 2 citations, 2 distinct authors, 2 features
    assert_eq!(graph.node_count(), 17);
    assert_eq!(graph.edge_count(), 17);

    let authors: Vec<_> = graph
        .nodes()
        .filter(|n| n.label.as_deref() == Some("Author"))
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(authors, vec!["Pani L.", "Overdier D.G."]);

    let has_author = graph
        .edges()
        .iter()
        .filter(|e| e.label == "HAS_AUTHOR")
        .count();
    assert_eq!(has_author, 3);

    let protein = graph
        .nodes()
        .find(|n| n.label.as_deref() == Some("Protein"))
        .unwrap();
    assert_eq!(protein.attributes["dataset"], json!("Swiss-Prot"));
    assert_eq!(protein.attributes["version"], json!(154));
    assert_eq!(protein.attributes["created"], json!("2000-05-30"));

    let taxonomy = graph.node("9606").unwrap();
    assert_eq!(taxonomy.label.as_deref(), Some("DbReference"));
    assert_eq!(taxonomy.attributes["type"], json!("NCBI Taxonomy"));

    let citations: Vec<_> = graph
        .nodes()
        .filter(|n| n.label.as_deref() == Some("Citation"))
        .collect();
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].attributes["name"], json!("Genomics"));
    assert_eq!(citations[0].attributes["date"], json!(1994));
    assert_eq!(citations[1].attributes["date"], json!("2001-02"));
}

#[test]
fn test_edges_reference_existing_nodes() {
    let graph = uniprot();
    for edge in graph.edges() {
        assert!(graph.contains_node(&edge.source), "dangling source {}", edge.source);
        assert!(graph.contains_node(&edge.target), "dangling target {}", edge.target);
    }
}

#[test]
fn test_export_and_reimport_both_formats() {
    let graph = uniprot();
    let dir = tempfile::tempdir().unwrap();
    let gexf = dir.path().join("out").join("uniprot.gexf");
    let graphml = dir.path().join("out").join("uniprot.graphml");

    export(&graph, &gexf, &graphml).unwrap();

    let from_gexf = read_gexf(&gexf).unwrap();
    let from_graphml = read_graphml(&graphml).unwrap();
    assert_eq!(from_gexf, graph);
    assert_eq!(from_graphml, graph);
}

#[test]
fn test_people_round_trip_keeps_placeholder() {
    let schema = Schema::from_file(fixture("people.schema.yaml")).unwrap();
    let graph = parse(fixture("people.xml"), &schema).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let gexf = dir.path().join("people.gexf");
    let graphml = dir.path().join("people.graphml");

    export(&graph, &gexf, &graphml).unwrap();

    for back in [read_gexf(&gexf).unwrap(), read_graphml(&graphml).unwrap()] {
        assert_eq!(back.node_count(), 2);
        assert_eq!(back.edge_count(), 1);
        assert!(back.node("2").unwrap().is_placeholder());

        let alice = back.node("1").unwrap();
        assert_eq!(alice.label.as_deref(), Some("person"));
        assert_eq!(alice.attributes["name"], json!("Alice"));
        assert_eq!(alice.attributes["age"], json!(34));

        let edge = &back.edges()[0];
        assert_eq!(edge.key(), ("1", "2", "knows"));
        assert_eq!(edge.attributes["since"], json!(2019));
    }
}

#[test]
fn test_pagerank_column_does_not_change_graph() {
    let graph = uniprot();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ranked.gexf");

    Exporter::default()
        .with_pagerank(true)
        .export_gexf(&graph, &path)
        .unwrap();

    let document = std::fs::read_to_string(&path).unwrap();
    assert!(document.contains(r#"title="pagerank""#));

    let back = read_gexf(&path).unwrap();
    assert_eq!(back.node_count(), graph.node_count());
    let ranked = back
        .nodes()
        .filter(|n| n.attributes.contains_key("pagerank"))
        .count();
    assert_eq!(ranked, graph.node_count());
}

#[test]
fn test_export_to_unwritable_path_is_io_error() {
    let graph = uniprot();
    let dir = tempfile::tempdir().unwrap();
    // A file where a directory is expected
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();

    let err = export(&graph, blocker.join("a.gexf"), blocker.join("a.graphml")).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[tokio::test]
async fn test_loading_twice_is_idempotent() {
    let schema = Schema::from_file(fixture("people.schema.yaml")).unwrap();
    let graph = parse(fixture("people.xml"), &schema).unwrap();

    let mut loader = Loader::new(MemoryStore::new(), LoadOptions::default());
    loader.load(&graph).await.unwrap();
    loader.load(&graph).await.unwrap();

    let store = loader.into_store();
    assert_eq!(store.node_count(), 2);
    assert_eq!(store.edge_count(), 1);
    assert_eq!(store.edge("1", "knows", "2").unwrap()["since"], json!(2019));
}

#[tokio::test]
async fn test_reimported_graph_loads_same_counts() {
    let graph = uniprot();
    let dir = tempfile::tempdir().unwrap();
    let graphml = dir.path().join("uniprot.graphml");
    Exporter::default().export_graphml(&graph, &graphml).unwrap();
    let back = read_graphml(&graphml).unwrap();

    let mut original = Loader::new(MemoryStore::new(), LoadOptions::default());
    let mut reimported = Loader::new(MemoryStore::new(), LoadOptions::default());
    let a = original.load(&graph).await.unwrap();
    let b = reimported.load(&back).await.unwrap();
    assert_eq!(a, b);

    let labels: HashSet<_> = graph.nodes().filter_map(|n| n.label.clone()).collect();
    assert_eq!(labels.len(), 10);
}

fn people(xml: &str) -> xml2graph_core::Graph {
    let schema = Schema::from_file(fixture("people.schema.yaml")).unwrap();
    parse_str(xml, &schema).unwrap()
}

#[test]
fn test_mixed_type_attribute_round_trip() {
    let graph = people(
        r#"<people><person id="1" zip="12345"/><person id="2" zip="A1B"/></people>"#,
    );
    assert_eq!(graph.node("1").unwrap().attributes["zip"], json!(12345));

    let dir = tempfile::tempdir().unwrap();
    let gexf = dir.path().join("zip.gexf");
    let graphml = dir.path().join("zip.graphml");
    export(&graph, &gexf, &graphml).unwrap();

    for back in [read_gexf(&gexf).unwrap(), read_graphml(&graphml).unwrap()] {
        assert_eq!(back.node("1").unwrap().attributes["zip"], json!(12345));
        assert_eq!(back.node("2").unwrap().attributes["zip"], json!("A1B"));
        assert_eq!(back, graph);
    }
}

#[test]
fn test_multi_line_attribute_round_trip() {
    let graph = people(r#"<people><person id="1" note="a&#10;b&#9;c"/></people>"#);
    assert_eq!(graph.node("1").unwrap().attributes["note"], json!("a\nb\tc"));

    let dir = tempfile::tempdir().unwrap();
    let gexf = dir.path().join("note.gexf");
    let graphml = dir.path().join("note.graphml");
    export(&graph, &gexf, &graphml).unwrap();

    for back in [read_gexf(&gexf).unwrap(), read_graphml(&graphml).unwrap()] {
        assert_eq!(back.node("1").unwrap().attributes["note"], json!("a\nb\tc"));
    }
}
