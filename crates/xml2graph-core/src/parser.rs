//! XML reading and element-to-graph mapping

use std::borrow::Cow;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::graph::{Attributes, Graph, GraphBuilder};
use crate::schema::{ElementKind, EndpointRef, EntityRule, IdSource, RelationshipRule, Schema};

/// Read an XML file and map it to a graph.
pub fn parse(path: impl AsRef<Path>, schema: &Schema) -> Result<Graph> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let graph = parse_str(&xml, schema)?;

    let placeholders = graph.nodes().filter(|n| n.is_placeholder()).count();
    info!(
        path = %path.display(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        placeholders,
        "parsed XML document"
    );
    if placeholders > 0 {
        warn!("{placeholders} node(s) are referenced by edges but never declared");
    }

    Ok(graph)
}

/// Map an in-memory XML document to a graph.
pub fn parse_str(xml: &str, schema: &Schema) -> Result<Graph> {
    XmlGraphParser::new(schema).run(xml)
}

/// Convert attribute or text content to a scalar.
///
/// With inference enabled, values are only converted when the converted
/// form prints back to exactly the same text, so `007` and `2.0` stay
/// strings.
pub fn coerce_value(raw: &str, infer_types: bool) -> JsonValue {
    if !infer_types {
        return JsonValue::String(raw.to_string());
    }

    match raw {
        "true" => return JsonValue::Bool(true),
        "false" => return JsonValue::Bool(false),
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        if n.to_string() == raw {
            return JsonValue::from(n);
        }
    }

    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() && f.to_string() == raw {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return JsonValue::Number(n);
            }
        }
    }

    JsonValue::String(raw.to_string())
}

enum Frame<'s> {
    Entity {
        rule: &'s EntityRule,
        id: String,
        text: String,
    },
    Relationship {
        rule: &'s RelationshipRule,
        source: Option<String>,
        target: Option<String>,
        attributes: Attributes,
        position: u64,
    },
    Other,
}

struct XmlGraphParser<'s> {
    schema: &'s Schema,
    builder: GraphBuilder,
    stack: Vec<Frame<'s>>,
    generated: usize,
    roots: usize,
}

impl<'s> XmlGraphParser<'s> {
    fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            builder: GraphBuilder::new(),
            stack: Vec::new(),
            generated: 0,
            roots: 0,
        }
    }

    fn run(mut self, xml: &str) -> Result<Graph> {
        let mut reader = Reader::from_str(xml);

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader.read_event().map_err(|e| Error::Parse {
                position: reader.error_position() as u64,
                message: e.to_string(),
            })?;

            match event {
                Event::Start(e) => self.open(&e, position)?,
                Event::Empty(e) => {
                    self.open(&e, position)?;
                    self.close(position)?;
                }
                Event::End(_) => self.close(position)?,
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| Error::Parse {
                        position,
                        message: e.to_string(),
                    })?;
                    self.text(&text, position)?;
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c);
                    self.text(&text, position)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !self.stack.is_empty() {
            return Err(Error::Parse {
                position: xml.len() as u64,
                message: format!("{} element(s) left unclosed", self.stack.len()),
            });
        }
        if self.roots == 0 {
            return Err(Error::Parse {
                position: 0,
                message: "document has no root element".to_string(),
            });
        }

        Ok(self.builder.into_graph())
    }

    fn open(&mut self, element: &BytesStart<'_>, position: u64) -> Result<()> {
        if self.stack.is_empty() {
            self.roots += 1;
            if self.roots > 1 {
                return Err(Error::Parse {
                    position,
                    message: "document has more than one root element".to_string(),
                });
            }
        }

        let name = decode_name(element.local_name().as_ref(), position)?;
        let mut attributes = read_attributes(element, position)?;

        self.fill_child_endpoint(&name, &attributes);

        let schema = self.schema;
        let frame = match schema.classify(&name) {
            Some(ElementKind::Entity(rule)) => self.open_entity(rule, &mut attributes, position)?,
            Some(ElementKind::Relationship(rule)) => {
                self.open_relationship(rule, attributes, position)
            }
            None => {
                debug!(element = %name, "skipping unmapped element");
                Frame::Other
            }
        };

        self.stack.push(frame);
        Ok(())
    }

    fn open_entity(
        &mut self,
        rule: &'s EntityRule,
        attributes: &mut Vec<(String, String)>,
        position: u64,
    ) -> Result<Frame<'s>> {
        let id = match &rule.id {
            IdSource::Attribute(attr) => match take_attribute(attributes, attr) {
                Some(value) if !value.trim().is_empty() => value,
                _ => {
                    return Err(Error::Schema {
                        position,
                        element: rule.element.clone(),
                        attribute: attr.clone(),
                    });
                }
            },
            IdSource::Generated => {
                self.generated += 1;
                format!("_:{}{}", rule.element, self.generated)
            }
        };

        let values = self.to_attributes(std::mem::take(attributes));
        self.builder
            .upsert_node(&id, Some(rule.label().to_string()), values);

        if let Some(edge_label) = &rule.parent_edge {
            match self.enclosing_entity().map(str::to_string) {
                Some(parent) => {
                    self.builder
                        .add_edge(&parent, &id, edge_label, Attributes::new());
                }
                None => debug!(element = %rule.element, "no enclosing entity for parent edge"),
            }
        }

        Ok(Frame::Entity {
            rule,
            id,
            text: String::new(),
        })
    }

    fn open_relationship(
        &mut self,
        rule: &'s RelationshipRule,
        mut attributes: Vec<(String, String)>,
        position: u64,
    ) -> Frame<'s> {
        let source = self.resolve_endpoint(&rule.source, &mut attributes);
        let target = self.resolve_endpoint(&rule.target, &mut attributes);

        Frame::Relationship {
            rule,
            source,
            target,
            attributes: self.to_attributes(attributes),
            position,
        }
    }

    fn resolve_endpoint(
        &self,
        endpoint: &EndpointRef,
        attributes: &mut Vec<(String, String)>,
    ) -> Option<String> {
        match endpoint {
            EndpointRef::Attribute(name) => {
                take_attribute(attributes, name).filter(|v| !v.trim().is_empty())
            }
            EndpointRef::Parent => self.enclosing_entity().map(str::to_string),
            // Filled in when the nested element is reached
            EndpointRef::Child { .. } => None,
        }
    }

    /// Record nested endpoint references on the nearest open relationship.
    fn fill_child_endpoint(&mut self, name: &str, attributes: &[(String, String)]) {
        let Some(Frame::Relationship {
            rule,
            source,
            target,
            ..
        }) = self
            .stack
            .iter_mut()
            .rev()
            .find(|frame| matches!(frame, Frame::Relationship { .. }))
        else {
            return;
        };

        for (endpoint, slot) in [(&rule.source, source), (&rule.target, target)] {
            if let EndpointRef::Child { element, attribute } = endpoint {
                if element == name && slot.is_none() {
                    *slot = attributes
                        .iter()
                        .find(|(key, value)| key == attribute && !value.trim().is_empty())
                        .map(|(_, value)| value.clone());
                }
            }
        }
    }

    fn close(&mut self, position: u64) -> Result<()> {
        let frame = self.stack.pop().ok_or_else(|| Error::Parse {
            position,
            message: "closing tag without a matching opening tag".to_string(),
        })?;

        match frame {
            Frame::Entity { rule, id, text } => {
                if let Some(attr) = &rule.text {
                    let text = text.trim();
                    if !text.is_empty() {
                        let value = coerce_value(text, self.schema.infer_types);
                        self.builder.set_node_attribute(&id, attr, value);
                    }
                }
            }
            Frame::Relationship {
                rule,
                source,
                target,
                attributes,
                position,
            } => {
                let missing = |end: &str| Error::Parse {
                    position,
                    message: format!("<{}> is missing its {end} reference", rule.element),
                };
                let source = source.ok_or_else(|| missing("source"))?;
                let target = target.ok_or_else(|| missing("target"))?;
                self.builder
                    .add_edge(&source, &target, rule.label(), attributes);
            }
            Frame::Other => {}
        }

        Ok(())
    }

    fn text(&mut self, text: &str, position: u64) -> Result<()> {
        match self.stack.last_mut() {
            Some(Frame::Entity {
                rule,
                text: buffer,
                ..
            }) if rule.text.is_some() => buffer.push_str(text),
            Some(_) => {}
            None if !text.trim().is_empty() => {
                return Err(Error::Parse {
                    position,
                    message: "text outside the root element".to_string(),
                });
            }
            None => {}
        }
        Ok(())
    }

    fn enclosing_entity(&self) -> Option<&str> {
        self.stack.iter().rev().find_map(|frame| match frame {
            Frame::Entity { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    fn to_attributes(&self, raw: Vec<(String, String)>) -> Attributes {
        raw.into_iter()
            .map(|(key, value)| {
                let value = coerce_value(&value, self.schema.infer_types);
                (key, value)
            })
            .collect()
    }
}

fn decode_name(raw: &[u8], position: u64) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| Error::Parse {
            position,
            message: e.to_string(),
        })
}

/// Attributes in document order, namespace declarations dropped.
///
/// Prefixed attributes are keyed by local name unless the prefix is `xml`
/// or another attribute on the element has the same local name. In those
/// cases the qualified name (`xml:lang`) is kept so no value is lost.
fn read_attributes(element: &BytesStart<'_>, position: u64) -> Result<Vec<(String, String)>> {
    let parse_error = |message: String| Error::Parse { position, message };
    let mut raw = Vec::new();

    for attr in element.attributes() {
        let attr = attr.map_err(|e| parse_error(e.to_string()))?;
        let qualified = attr.key.as_ref();
        if qualified == b"xmlns" || qualified.starts_with(b"xmlns:") {
            continue;
        }
        let name = decode_name(qualified, position)?;
        let local = decode_name(attr.key.local_name().as_ref(), position)?;
        let value: Cow<'_, str> = attr
            .unescape_value()
            .map_err(|e| parse_error(e.to_string()))?;
        raw.push((name, local, value.into_owned()));
    }

    let out = raw
        .iter()
        .map(|(name, local, value)| {
            let prefixed = name != local;
            let shared = raw.iter().filter(|(_, other, _)| other == local).count() > 1;
            let key = if prefixed && (name.starts_with("xml:") || shared) {
                name.clone()
            } else {
                local.clone()
            };
            (key, value.clone())
        })
        .collect();
    Ok(out)
}

fn take_attribute(attributes: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let idx = attributes.iter().position(|(key, _)| key == name)?;
    Some(attributes.remove(idx).1)
}
