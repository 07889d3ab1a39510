//! Element-to-graph mapping rules
//!
//! A [`Schema`] names the closed set of XML elements the parser recognises.
//! Entity elements become nodes, relationship elements become edges, every
//! other element is walked through without producing anything.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mapping configuration for one document type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub entities: Vec<EntityRule>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRule>,
    /// Convert attribute text such as `42`, `1.5` or `true` into numbers and booleans.
    #[serde(default = "default_infer_types")]
    pub infer_types: bool,
}

/// An element that maps to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRule {
    /// Local element name, namespace prefix ignored.
    pub element: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub id: IdSource,
    /// Node label; defaults to the element name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Store the element's trimmed text content under this attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Link the nearest enclosing entity to this one with an edge of this label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_edge: Option<String>,
}

/// An element that maps to an edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRule {
    pub element: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub source: EndpointRef,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub target: EndpointRef,
    /// Edge label; defaults to the element name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Where an entity's identifier comes from.
///
/// Written as `{ attribute: name }` or `generated` in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// A required attribute on the element.
    Attribute(String),
    /// A deterministic id derived from the element name and document order.
    Generated,
}

/// Where one end of a relationship comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRef {
    /// An attribute on the relationship element itself.
    Attribute(String),
    /// The nearest enclosing entity element.
    Parent,
    /// An attribute on a nested element, e.g. `<knows><to ref="2"/></knows>`.
    Child { element: String, attribute: String },
}

/// The recognised kind of an element.
#[derive(Debug, Clone, Copy)]
pub enum ElementKind<'a> {
    Entity(&'a EntityRule),
    Relationship(&'a RelationshipRule),
}

fn default_infer_types() -> bool {
    true
}

static XML_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("invalid name regex"));

impl Schema {
    /// Load a schema from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let schema: Schema = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid schema: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check that the rule set is usable before any document is read.
    pub fn validate(&self) -> Result<()> {
        if self.entities.is_empty() && self.relationships.is_empty() {
            return Err(Error::Config(
                "schema declares no entity or relationship elements".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let names = self
            .entities
            .iter()
            .map(|rule| &rule.element)
            .chain(self.relationships.iter().map(|rule| &rule.element));
        for name in names {
            check_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(Error::Config(format!(
                    "element <{name}> is mapped more than once"
                )));
            }
        }

        for rule in &self.entities {
            if let IdSource::Attribute(attr) = &rule.id {
                check_name(attr)?;
            }
            if matches!(rule.label.as_deref(), Some("")) {
                return Err(Error::Config(format!("<{}> has an empty label", rule.element)));
            }
        }

        for rule in &self.relationships {
            if matches!(rule.label.as_deref(), Some("")) {
                return Err(Error::Config(format!("<{}> has an empty label", rule.element)));
            }
            if let (
                EndpointRef::Child { element: a, attribute: x },
                EndpointRef::Child { element: b, attribute: y },
            ) = (&rule.source, &rule.target)
            {
                if a == b && x == y {
                    return Err(Error::Config(format!(
                        "<{}> uses <{a} {x}> for both endpoints",
                        rule.element
                    )));
                }
            }
            if let (EndpointRef::Attribute(a), EndpointRef::Attribute(b)) =
                (&rule.source, &rule.target)
            {
                if a == b {
                    return Err(Error::Config(format!(
                        "<{}> uses `{a}` for both endpoints",
                        rule.element
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up how an element with this local name is mapped.
    pub fn classify(&self, element: &str) -> Option<ElementKind<'_>> {
        if let Some(rule) = self.entities.iter().find(|r| r.element == element) {
            return Some(ElementKind::Entity(rule));
        }
        self.relationships
            .iter()
            .find(|r| r.element == element)
            .map(ElementKind::Relationship)
    }
}

impl EntityRule {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.element)
    }
}

impl RelationshipRule {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.element)
    }

    /// Attributes of the relationship element consumed as endpoints.
    pub fn endpoint_attributes(&self) -> impl Iterator<Item = &str> {
        [&self.source, &self.target]
            .into_iter()
            .filter_map(|endpoint| match endpoint {
                EndpointRef::Attribute(name) => Some(name.as_str()),
                _ => None,
            })
    }
}

fn check_name(name: &str) -> Result<()> {
    if XML_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::Config(format!("`{name}` is not a valid XML name")))
    }
}
