//! GEXF 1.2 writer and reader

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::warn;

use super::{
    AttrType, ColumnSet, collect_columns, column_of, data_attribute, emit, format_error,
    read_source, read_value, render_value,
};
use crate::error::{Error, Result};
use crate::graph::{Attributes, Graph, GraphBuilder};

const NAMESPACE: &str = "http://gexf.net/1.2";
const PAGERANK_COLUMN: &str = "pagerank";

/// Render a graph as a GEXF document.
///
/// When `pagerank` is given its scores are written as an extra `double`
/// node column titled `pagerank`. If a node attribute already uses that
/// title the column becomes `pagerank_1` (or the next free suffix).
pub fn write_gexf(graph: &Graph, pagerank: Option<&HashMap<String, f64>>) -> Result<Vec<u8>> {
    let mut node_columns = collect_columns(graph.nodes().map(|n| &n.attributes))?;
    let pagerank_column = pagerank.map(|_| {
        let title = pagerank_title(&node_columns);
        node_columns.insert_full((title, AttrType::Double)).0
    });
    let edge_columns = collect_columns(graph.edges().iter().map(|e| &e.attributes))?;

    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(
        &mut w,
        Event::Start(
            BytesStart::new("gexf").with_attributes([("xmlns", NAMESPACE), ("version", "1.2")]),
        ),
    )?;

    emit(&mut w, Event::Start(BytesStart::new("meta")))?;
    emit(&mut w, Event::Start(BytesStart::new("creator")))?;
    emit(
        &mut w,
        Event::Text(BytesText::new(concat!(
            "xml2graph ",
            env!("CARGO_PKG_VERSION")
        ))),
    )?;
    emit(&mut w, Event::End(BytesEnd::new("creator")))?;
    emit(&mut w, Event::End(BytesEnd::new("meta")))?;

    emit(
        &mut w,
        Event::Start(
            BytesStart::new("graph")
                .with_attributes([("defaultedgetype", "directed"), ("mode", "static")]),
        ),
    )?;
    write_columns(&mut w, "node", &node_columns)?;
    write_columns(&mut w, "edge", &edge_columns)?;

    emit(&mut w, Event::Start(BytesStart::new("nodes")))?;
    for node in graph.nodes() {
        let mut start = BytesStart::new("node");
        start.push_attribute(data_attribute("id", &node.id));
        if let Some(label) = &node.label {
            start.push_attribute(data_attribute("label", label));
        }

        let score = pagerank_column.zip(pagerank.and_then(|scores| scores.get(&node.id)));
        if node.attributes.is_empty() && score.is_none() {
            emit(&mut w, Event::Empty(start))?;
            continue;
        }

        emit(&mut w, Event::Start(start))?;
        emit(&mut w, Event::Start(BytesStart::new("attvalues")))?;
        write_values(&mut w, &node_columns, &node.attributes)?;
        if let Some((idx, score)) = score {
            write_value(&mut w, idx, &score.to_string())?;
        }
        emit(&mut w, Event::End(BytesEnd::new("attvalues")))?;
        emit(&mut w, Event::End(BytesEnd::new("node")))?;
    }
    emit(&mut w, Event::End(BytesEnd::new("nodes")))?;

    emit(&mut w, Event::Start(BytesStart::new("edges")))?;
    for (idx, edge) in graph.edges().iter().enumerate() {
        let id = idx.to_string();
        let mut start = BytesStart::new("edge").with_attributes([("id", id.as_str())]);
        start.push_attribute(data_attribute("source", &edge.source));
        start.push_attribute(data_attribute("target", &edge.target));
        start.push_attribute(data_attribute("label", &edge.label));
        if edge.attributes.is_empty() {
            emit(&mut w, Event::Empty(start))?;
            continue;
        }
        emit(&mut w, Event::Start(start))?;
        emit(&mut w, Event::Start(BytesStart::new("attvalues")))?;
        write_values(&mut w, &edge_columns, &edge.attributes)?;
        emit(&mut w, Event::End(BytesEnd::new("attvalues")))?;
        emit(&mut w, Event::End(BytesEnd::new("edge")))?;
    }
    emit(&mut w, Event::End(BytesEnd::new("edges")))?;

    emit(&mut w, Event::End(BytesEnd::new("graph")))?;
    emit(&mut w, Event::End(BytesEnd::new("gexf")))?;
    Ok(w.into_inner())
}

fn pagerank_title(columns: &ColumnSet) -> String {
    let taken = |title: &str| columns.iter().any(|(name, _)| name == title);
    if !taken(PAGERANK_COLUMN) {
        return PAGERANK_COLUMN.to_string();
    }
    let title = (1..)
        .map(|n| format!("{PAGERANK_COLUMN}_{n}"))
        .find(|title| !taken(title))
        .unwrap_or_default();
    warn!(
        column = %title,
        "a node attribute is already named `{PAGERANK_COLUMN}`; writing scores under another title"
    );
    title
}

fn write_columns(w: &mut Writer<Vec<u8>>, class: &str, columns: &ColumnSet) -> Result<()> {
    if columns.is_empty() {
        return Ok(());
    }
    emit(
        w,
        Event::Start(
            BytesStart::new("attributes").with_attributes([("class", class), ("mode", "static")]),
        ),
    )?;
    for (idx, (title, ty)) in columns.iter().enumerate() {
        let id = idx.to_string();
        let mut column = BytesStart::new("attribute").with_attributes([("id", id.as_str())]);
        column.push_attribute(data_attribute("title", title));
        column.push_attribute(("type", ty.name("long")));
        emit(w, Event::Empty(column))?;
    }
    emit(w, Event::End(BytesEnd::new("attributes")))
}

fn write_values(
    w: &mut Writer<Vec<u8>>,
    columns: &ColumnSet,
    attributes: &Attributes,
) -> Result<()> {
    for (name, value) in attributes {
        if let Some(idx) = column_of(columns, name, value)? {
            write_value(w, idx, &render_value(value))?;
        }
    }
    Ok(())
}

fn write_value(w: &mut Writer<Vec<u8>>, column: usize, value: &str) -> Result<()> {
    let id = column.to_string();
    let mut attvalue = BytesStart::new("attvalue").with_attributes([("for", id.as_str())]);
    attvalue.push_attribute(data_attribute("value", value));
    emit(w, Event::Empty(attvalue))
}

/// Load a GEXF file written by [`write_gexf`] (or any tool emitting the same subset).
pub fn read_gexf(path: impl AsRef<Path>) -> Result<Graph> {
    read_gexf_str(&read_source(path.as_ref())?)
}

#[derive(Default)]
struct Columns {
    node: HashMap<String, (String, AttrType)>,
    edge: HashMap<String, (String, AttrType)>,
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
        label: String,
        attributes: Attributes,
    },
}

pub fn read_gexf_str(xml: &str) -> Result<Graph> {
    let mut reader = Reader::from_str(xml);
    let mut builder = GraphBuilder::new();
    let mut columns = Columns::default();
    let mut class = String::new();
    let mut owner: Option<Owner> = None;
    let mut seen_root = false;

    loop {
        let event = reader.read_event().map_err(|e| format_error("GEXF", e))?;
        let (element, is_empty) = match &event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"node" | b"edge" => finish(&mut builder, owner.take()),
                    _ => {}
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let attrs = attribute_map(element)?;
        match element.local_name().as_ref() {
            b"gexf" => seen_root = true,
            b"attributes" => class = attrs.get("class").cloned().unwrap_or_default(),
            b"attribute" => {
                let id = required(&attrs, "id", "attribute")?;
                let title = attrs.get("title").cloned().unwrap_or_else(|| id.clone());
                let ty = attrs
                    .get("type")
                    .map(|t| {
                        AttrType::parse(t)
                            .ok_or_else(|| Error::Format(format!("unsupported GEXF type `{t}`")))
                    })
                    .transpose()?
                    .unwrap_or(AttrType::String);
                let target = if class == "edge" {
                    &mut columns.edge
                } else {
                    &mut columns.node
                };
                target.insert(id, (title, ty));
            }
            b"node" => {
                owner = Some(Owner::Node {
                    id: required(&attrs, "id", "node")?,
                    label: attrs.get("label").cloned(),
                    attributes: Attributes::new(),
                });
            }
            b"edge" => {
                owner = Some(Owner::Edge {
                    source: required(&attrs, "source", "edge")?,
                    target: required(&attrs, "target", "edge")?,
                    label: attrs.get("label").cloned().unwrap_or_default(),
                    attributes: Attributes::new(),
                });
            }
            b"attvalue" => {
                let key = required(&attrs, "for", "attvalue")?;
                let raw = required(&attrs, "value", "attvalue")?;
                let (table, attributes) = match owner.as_mut() {
                    Some(Owner::Node { attributes, .. }) => (&columns.node, attributes),
                    Some(Owner::Edge { attributes, .. }) => (&columns.edge, attributes),
                    None => continue,
                };
                let (title, ty) = table
                    .get(&key)
                    .ok_or_else(|| Error::Format(format!("undeclared GEXF attribute `{key}`")))?;
                attributes.insert(title.clone(), read_value(&raw, *ty)?);
            }
            _ => {}
        }

        if is_empty && matches!(element.local_name().as_ref(), b"node" | b"edge") {
            finish(&mut builder, owner.take());
        }
    }

    if !seen_root {
        return Err(Error::Format("missing <gexf> root element".to_string()));
    }
    Ok(builder.into_graph())
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
        }) => builder.add_edge(&source, &target, &label, attributes),
        None => {}
    }
}

pub(crate) fn attribute_map(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| format_error("graph", e))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| format_error("graph", e))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

pub(crate) fn required(attrs: &HashMap<String, String>, key: &str, element: &str) -> Result<String> {
    attrs
        .get(key)
        .cloned()
        .ok_or_else(|| Error::Format(format!("<{element}> is missing `{key}`")))
}
