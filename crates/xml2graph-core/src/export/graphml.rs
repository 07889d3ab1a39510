//! GraphML writer and reader

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::gexf::{attribute_map, required};
use super::{
    AttrType, ColumnSet, collect_columns, column_of, data_attribute, emit, escape_value,
    format_error, read_source, read_value, render_value,
};
use crate::error::{Error, Result};
use crate::graph::{Attributes, Graph, GraphBuilder};

const NAMESPACE: &str = "http://graphml.graphdrawing.org/xmlns";
const SCHEMA_LOCATION: &str = "http://graphml.graphdrawing.org/xmlns http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd";

// Reserved key ids; user columns are numbered `n0..`/`e0..` so they never collide.
const NODE_LABEL_KEY: &str = "node_label";
const EDGE_LABEL_KEY: &str = "edge_label";

/// Render a graph as a GraphML document.
pub fn write_graphml(graph: &Graph) -> Result<Vec<u8>> {
    let node_columns = collect_columns(graph.nodes().map(|n| &n.attributes))?;
    let edge_columns = collect_columns(graph.edges().iter().map(|e| &e.attributes))?;

    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(
        &mut w,
        Event::Start(BytesStart::new("graphml").with_attributes([
            ("xmlns", NAMESPACE),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ("xsi:schemaLocation", SCHEMA_LOCATION),
        ])),
    )?;

    write_key(&mut w, NODE_LABEL_KEY, "node", "label", AttrType::String)?;
    for (idx, (name, ty)) in node_columns.iter().enumerate() {
        write_key(&mut w, &format!("n{idx}"), "node", name, *ty)?;
    }
    write_key(&mut w, EDGE_LABEL_KEY, "edge", "label", AttrType::String)?;
    for (idx, (name, ty)) in edge_columns.iter().enumerate() {
        write_key(&mut w, &format!("e{idx}"), "edge", name, *ty)?;
    }

    emit(
        &mut w,
        Event::Start(
            BytesStart::new("graph").with_attributes([("id", "G"), ("edgedefault", "directed")]),
        ),
    )?;

    for node in graph.nodes() {
        let mut start = BytesStart::new("node");
        start.push_attribute(data_attribute("id", &node.id));
        if node.label.is_none() && node.attributes.is_empty() {
            emit(&mut w, Event::Empty(start))?;
            continue;
        }
        emit(&mut w, Event::Start(start))?;
        if let Some(label) = &node.label {
            write_data(&mut w, NODE_LABEL_KEY, label)?;
        }
        write_values(&mut w, "n", &node_columns, &node.attributes)?;
        emit(&mut w, Event::End(BytesEnd::new("node")))?;
    }

    for (idx, edge) in graph.edges().iter().enumerate() {
        let id = format!("e{idx}");
        let mut start = BytesStart::new("edge").with_attributes([("id", id.as_str())]);
        start.push_attribute(data_attribute("source", &edge.source));
        start.push_attribute(data_attribute("target", &edge.target));
        emit(&mut w, Event::Start(start))?;
        write_data(&mut w, EDGE_LABEL_KEY, &edge.label)?;
        write_values(&mut w, "e", &edge_columns, &edge.attributes)?;
        emit(&mut w, Event::End(BytesEnd::new("edge")))?;
    }

    emit(&mut w, Event::End(BytesEnd::new("graph")))?;
    emit(&mut w, Event::End(BytesEnd::new("graphml")))?;
    Ok(w.into_inner())
}

fn write_key(
    w: &mut Writer<Vec<u8>>,
    id: &str,
    domain: &str,
    name: &str,
    ty: AttrType,
) -> Result<()> {
    let mut key = BytesStart::new("key").with_attributes([("id", id), ("for", domain)]);
    key.push_attribute(data_attribute("attr.name", name));
    key.push_attribute(("attr.type", ty.name("long")));
    emit(w, Event::Empty(key))
}

fn write_data(w: &mut Writer<Vec<u8>>, key: &str, value: &str) -> Result<()> {
    emit(
        w,
        Event::Start(BytesStart::new("data").with_attributes([("key", key)])),
    )?;
    emit(w, Event::Text(BytesText::from_escaped(escape_value(value))))?;
    emit(w, Event::End(BytesEnd::new("data")))
}

fn write_values(
    w: &mut Writer<Vec<u8>>,
    prefix: &str,
    columns: &ColumnSet,
    attributes: &Attributes,
) -> Result<()> {
    for (name, value) in attributes {
        if let Some(idx) = column_of(columns, name, value)? {
            write_data(w, &format!("{prefix}{idx}"), &render_value(value))?;
        }
    }
    Ok(())
}

/// Load a GraphML file written by [`write_graphml`].
pub fn read_graphml(path: impl AsRef<Path>) -> Result<Graph> {
    read_graphml_str(&read_source(path.as_ref())?)
}

enum Owner {
    Node {
        id: String,
        label: Option<String>,
        attributes: Attributes,
    },
    Edge {
        source: String,
        target: String,
        label: Option<String>,
        attributes: Attributes,
    },
}

pub fn read_graphml_str(xml: &str) -> Result<Graph> {
    let mut reader = Reader::from_str(xml);
    let mut builder = GraphBuilder::new();
    let mut keys: HashMap<String, (String, AttrType)> = HashMap::new();
    let mut owner: Option<Owner> = None;
    let mut data: Option<(String, String)> = None;
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format_error("GraphML", e))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let attrs = attribute_map(e)?;
                match e.local_name().as_ref() {
                    b"graphml" => seen_root = true,
                    b"key" => {
                        let id = required(&attrs, "id", "key")?;
                        let name = attrs.get("attr.name").cloned().unwrap_or_else(|| id.clone());
                        let ty = match attrs.get("attr.type") {
                            Some(t) => AttrType::parse(t).ok_or_else(|| {
                                Error::Format(format!("unsupported GraphML type `{t}`"))
                            })?,
                            None => AttrType::String,
                        };
                        keys.insert(id, (name, ty));
                    }
                    b"node" => {
                        owner = Some(Owner::Node {
                            id: required(&attrs, "id", "node")?,
                            label: None,
                            attributes: Attributes::new(),
                        });
                        if is_empty {
                            finish(&mut builder, owner.take());
                        }
                    }
                    b"edge" => {
                        owner = Some(Owner::Edge {
                            source: required(&attrs, "source", "edge")?,
                            target: required(&attrs, "target", "edge")?,
                            label: None,
                            attributes: Attributes::new(),
                        });
                        if is_empty {
                            finish(&mut builder, owner.take());
                        }
                    }
                    b"data" => {
                        let key = required(&attrs, "key", "data")?;
                        if is_empty {
                            store(&keys, owner.as_mut(), key, String::new())?;
                        } else {
                            data = Some((key, String::new()));
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some((_, buffer)) = data.as_mut() {
                    let text = t.unescape().map_err(|e| format_error("GraphML", e))?;
                    buffer.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some((_, buffer)) = data.as_mut() {
                    buffer.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"data" => {
                    if let Some((key, value)) = data.take() {
                        store(&keys, owner.as_mut(), key, value)?;
                    }
                }
                b"node" | b"edge" => finish(&mut builder, owner.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(Error::Format("missing <graphml> root element".to_string()));
    }
    Ok(builder.into_graph())
}

fn store(
    keys: &HashMap<String, (String, AttrType)>,
    owner: Option<&mut Owner>,
    key: String,
    value: String,
) -> Result<()> {
    let Some(owner) = owner else {
        // Graph-level data is not part of the model
        return Ok(());
    };

    match (owner, key.as_str()) {
        (Owner::Node { label, .. }, NODE_LABEL_KEY) => *label = Some(value),
        (Owner::Edge { label, .. }, EDGE_LABEL_KEY) => *label = Some(value),
        (Owner::Node { attributes, .. } | Owner::Edge { attributes, .. }, _) => {
            let (name, ty) = keys
                .get(&key)
                .ok_or_else(|| Error::Format(format!("undeclared GraphML key `{key}`")))?;
            attributes.insert(name.clone(), read_value(&value, *ty)?);
        }
    }
    Ok(())
}

fn finish(builder: &mut GraphBuilder, owner: Option<Owner>) {
    match owner {
        Some(Owner::Node {
            id,
            label,
            attributes,
        }) => builder.upsert_node(&id, label, attributes),
        Some(Owner::Edge {
            source,
            target,
            label,
            attributes,
        }) => builder.add_edge(&source, &target, &label.unwrap_or_default(), attributes),
        None => {}
    }
}
