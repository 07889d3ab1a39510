//! GEXF and GraphML serialization
//!
//! Both writers are lossless for the graphs the parser produces: every node
//! (id, label, attributes) and every edge (source, target, label,
//! attributes). The matching readers exist so exported files can be checked
//! by loading them back.

pub mod gexf;
pub mod graphml;

use std::borrow::Cow;
use std::path::Path;

use indexmap::IndexSet;
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::events::attributes::Attribute;
use quick_xml::name::QName;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::error::{Error, Result};
use crate::graph::{Attributes, Graph};
use crate::metrics::{PageRankConfig, page_rank};

pub use gexf::{read_gexf, write_gexf};
pub use graphml::{read_graphml, write_graphml};

/// Write `graph` to a GEXF file and a GraphML file.
pub fn export(
    graph: &Graph,
    gexf_path: impl AsRef<Path>,
    graphml_path: impl AsRef<Path>,
) -> Result<()> {
    Exporter::default().export(graph, gexf_path, graphml_path)
}

/// Export options.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    /// Add a `pagerank` node column to the GEXF output.
    pub pagerank: bool,
}

impl Exporter {
    pub fn with_pagerank(mut self, enabled: bool) -> Self {
        self.pagerank = enabled;
        self
    }

    pub fn export(
        &self,
        graph: &Graph,
        gexf_path: impl AsRef<Path>,
        graphml_path: impl AsRef<Path>,
    ) -> Result<()> {
        self.export_gexf(graph, gexf_path)?;
        self.export_graphml(graph, graphml_path)
    }

    pub fn export_gexf(&self, graph: &Graph, path: impl AsRef<Path>) -> Result<()> {
        let scores = if self.pagerank {
            Some(page_rank(graph, &PageRankConfig::default()))
        } else {
            None
        };
        let document = write_gexf(graph, scores.as_ref())?;
        write_file(path.as_ref(), &document)?;
        info!(path = %path.as_ref().display(), pagerank = self.pagerank, "wrote GEXF");
        Ok(())
    }

    pub fn export_graphml(&self, graph: &Graph, path: impl AsRef<Path>) -> Result<()> {
        let document = write_graphml(graph)?;
        write_file(path.as_ref(), &document)?;
        info!(path = %path.as_ref().display(), "wrote GraphML");
        Ok(())
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| Error::io(path, e))
}

/// Declared type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum AttrType {
    String,
    Long,
    Double,
    Boolean,
}

impl AttrType {
    pub(crate) fn of(name: &str, value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::String(_) => Ok(AttrType::String),
            JsonValue::Bool(_) => Ok(AttrType::Boolean),
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Ok(AttrType::Long),
            JsonValue::Number(_) => Ok(AttrType::Double),
            other => Err(Error::Format(format!(
                "attribute `{name}` holds a non-scalar value: {other}"
            ))),
        }
    }

    /// Type name shared by GEXF and GraphML except for integers.
    pub(crate) fn name(self, long: &'static str) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Long => long,
            AttrType::Double => "double",
            AttrType::Boolean => "boolean",
        }
    }

    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(AttrType::String),
            "long" | "integer" | "int" => Some(AttrType::Long),
            "double" | "float" => Some(AttrType::Double),
            "boolean" => Some(AttrType::Boolean),
            _ => None,
        }
    }
}

/// Attribute columns keyed by name and type, in first-seen order.
pub(crate) type ColumnSet = IndexSet<(String, AttrType)>;

/// Column declarations for a set of attribute maps.
///
/// An attribute whose values disagree on type gets one column per type, all
/// with the same title, so every value keeps its own type on reimport.
pub(crate) fn collect_columns<'a>(
    maps: impl Iterator<Item = &'a Attributes>,
) -> Result<ColumnSet> {
    let mut columns = ColumnSet::new();
    for map in maps {
        for (name, value) in map {
            let ty = AttrType::of(name, value)?;
            columns.insert((name.clone(), ty));
        }
    }
    Ok(columns)
}

/// Position of the column holding `value` for attribute `name`.
pub(crate) fn column_of(
    columns: &ColumnSet,
    name: &str,
    value: &JsonValue,
) -> Result<Option<usize>> {
    let ty = AttrType::of(name, value)?;
    Ok(columns.get_index_of(&(name.to_string(), ty)))
}

/// Escape text for XML output. Line breaks and tabs become character
/// references so readers do not normalise them to spaces.
pub(crate) fn escape_value(value: &str) -> String {
    let escaped = escape(value);
    if !escaped.contains(['\n', '\r', '\t']) {
        return escaped.into_owned();
    }
    let mut out = String::with_capacity(escaped.len() + 8);
    for c in escaped.chars() {
        match c {
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            other => out.push(other),
        }
    }
    out
}

/// An attribute whose value is escaped with [`escape_value`].
pub(crate) fn data_attribute<'a>(key: &'a str, value: &str) -> Attribute<'a> {
    Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escape_value(value).into_bytes()),
    }
}

pub(crate) fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn read_value(raw: &str, ty: AttrType) -> Result<JsonValue> {
    let invalid = || Error::Format(format!("`{raw}` is not a valid {ty:?} value"));
    match ty {
        AttrType::String => Ok(JsonValue::String(raw.to_string())),
        AttrType::Boolean => match raw.trim() {
            "true" | "1" => Ok(JsonValue::Bool(true)),
            "false" | "0" => Ok(JsonValue::Bool(false)),
            _ => Err(invalid()),
        },
        AttrType::Long => raw
            .trim()
            .parse::<i64>()
            .map(JsonValue::from)
            .map_err(|_| invalid()),
        AttrType::Double => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(invalid),
    }
}

pub(crate) fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Format(format!("failed to render XML: {e}")))
}

pub(crate) fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

pub(crate) fn format_error(kind: &str, e: impl std::fmt::Display) -> Error {
    Error::Format(format!("invalid {kind} document: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, JsonValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_collect_columns_types() {
        let a = attrs(&[("name", json!("Alice")), ("age", json!(30))]);
        let b = attrs(&[("score", json!(1.5)), ("active", json!(true))]);
        let columns = collect_columns([&a, &b].into_iter()).unwrap();

        let names: Vec<_> = columns.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["name", "age", "score", "active"]);
        assert_eq!(columns[1], ("age".to_string(), AttrType::Long));
        assert_eq!(columns[2], ("score".to_string(), AttrType::Double));
        assert_eq!(columns[3], ("active".to_string(), AttrType::Boolean));
    }

    #[test]
    fn test_mixed_column_splits_by_type() {
        let a = attrs(&[("code", json!(12))]);
        let b = attrs(&[("code", json!("A1"))]);
        let c = attrs(&[("code", json!(7))]);
        let columns = collect_columns([&a, &b, &c].into_iter()).unwrap();

        assert_eq!(columns.len(), 2);
        assert_eq!(column_of(&columns, "code", &json!(7)).unwrap(), Some(0));
        assert_eq!(column_of(&columns, "code", &json!("A1")).unwrap(), Some(1));
        assert_eq!(column_of(&columns, "code", &json!(true)).unwrap(), None);
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("plain"), "plain");
        assert_eq!(escape_value("a<b"), "a&lt;b");
        assert_eq!(escape_value("a\nb\r\tc & d"), "a&#10;b&#13;&#9;c &amp; d");
    }

    #[test]
    fn test_nested_value_rejected() {
        let a = attrs(&[("tags", json!(["x", "y"]))]);
        let err = collect_columns([&a].into_iter()).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_read_value() {
        assert_eq!(read_value("42", AttrType::Long).unwrap(), json!(42));
        assert_eq!(read_value("0.25", AttrType::Double).unwrap(), json!(0.25));
        assert_eq!(read_value("1", AttrType::Boolean).unwrap(), json!(true));
        assert_eq!(read_value(" x ", AttrType::String).unwrap(), json!(" x "));
        assert!(read_value("abc", AttrType::Long).is_err());
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("a b")), "a b");
        assert_eq!(render_value(&json!(42)), "42");
        assert_eq!(render_value(&json!(1.5)), "1.5");
        assert_eq!(render_value(&json!(false)), "false");
    }
}
