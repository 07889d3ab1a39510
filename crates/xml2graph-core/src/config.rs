//! Pipeline configuration file
//!
//! ```yaml
//! input: data/people.xml
//! schema: people.schema.yaml     # path, or the schema mapping inline
//! export:
//!   gexf: out/people.gexf
//!   graphml: out/people.graphml
//!   pagerank: true
//! database:
//!   url: http://localhost:7474
//!   user: neo4j
//!   password: secret
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loader::ConnectionConfig;
use crate::schema::Schema;

/// Main pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// XML document to convert.
    pub input: PathBuf,
    /// Element mapping.
    pub schema: SchemaSource,
    #[serde(default)]
    pub export: ExportConfig,
    /// Target database; without one the load step only runs in dry-run mode.
    #[serde(default)]
    pub database: Option<ConnectionConfig>,
    /// Load into an in-memory store instead of the database.
    #[serde(default)]
    pub dry_run: bool,
}

/// Where the element mapping comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaSource {
    Path(PathBuf),
    Inline(Schema),
}

/// Output files. Each format is written only when its path is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub gexf: Option<PathBuf>,
    #[serde(default)]
    pub graphml: Option<PathBuf>,
    /// Add a PageRank column to the GEXF nodes.
    #[serde(default)]
    pub pagerank: bool,
}

impl PipelineConfig {
    /// Load a configuration from a YAML file, resolving relative paths
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid pipeline config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            return Err(Error::Config("input path is empty".to_string()));
        }
        if let SchemaSource::Inline(schema) = &self.schema {
            schema.validate()?;
        }
        if let Some(database) = &self.database {
            database.validate()?;
        }
        if let (Some(gexf), Some(graphml)) = (&self.export.gexf, &self.export.graphml) {
            if gexf == graphml {
                return Err(Error::Config(format!(
                    "GEXF and GraphML outputs share the path {}",
                    gexf.display()
                )));
            }
        }
        Ok(())
    }

    /// Resolve the schema, reading it from disk when given as a path.
    pub fn load_schema(&self) -> Result<Schema> {
        match &self.schema {
            SchemaSource::Path(path) => Schema::from_file(path),
            SchemaSource::Inline(schema) => {
                schema.validate()?;
                Ok(schema.clone())
            }
        }
    }

    /// Override database settings from `NEO4J_URL`, `NEO4J_USER`,
    /// `NEO4J_PASSWORD` and `NEO4J_DATABASE`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply database overrides from `lookup`. A database section is created
    /// when the lookup provides a URL and the file had none.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.database.is_none() {
            match lookup("NEO4J_URL") {
                Some(url) => self.database = Some(ConnectionConfig::new(url, "neo4j", "")),
                None => return,
            }
        }
        let Some(database) = self.database.as_mut() else {
            return;
        };
        if let Some(url) = lookup("NEO4J_URL") {
            database.url = url;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            database.user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            database.password = password;
        }
        if let Some(name) = lookup("NEO4J_DATABASE") {
            database.database = name;
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.input);
        if let SchemaSource::Path(path) = &mut self.schema {
            resolve(path);
        }
        if let Some(path) = self.export.gexf.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.export.graphml.as_mut() {
            resolve(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const INLINE: &str = r#"
input: people.xml
schema:
  entities:
    - element: person
      id: { attribute: id }
  relationships:
    - element: knows
      source: { attribute: from }
      target: { attribute: to }
export:
  gexf: out/people.gexf
"#;

    #[test]
    fn test_inline_schema() {
        let config = PipelineConfig::from_yaml(INLINE).unwrap();
        assert!(matches!(config.schema, SchemaSource::Inline(_)));
        assert!(config.validate().is_ok());
        assert!(config.database.is_none());
        assert!(!config.export.pagerank);
        assert_eq!(config.load_schema().unwrap().entities.len(), 1);
    }

    #[test]
    fn test_schema_path() {
        let config =
            PipelineConfig::from_yaml("input: a.xml\nschema: mapping.yaml\n").unwrap();
        match config.schema {
            SchemaSource::Path(path) => assert_eq!(path, PathBuf::from("mapping.yaml")),
            SchemaSource::Inline(_) => panic!("expected a schema path"),
        }
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = PipelineConfig::from_yaml(INLINE).unwrap();
        config.resolve_paths(Path::new("/data/run"));
        assert_eq!(config.input, PathBuf::from("/data/run/people.xml"));
        assert_eq!(
            config.export.gexf,
            Some(PathBuf::from("/data/run/out/people.gexf"))
        );
    }

    #[test]
    fn test_same_output_path_rejected() {
        let mut config = PipelineConfig::from_yaml(INLINE).unwrap();
        config.export.graphml = config.export.gexf.clone();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NEO4J_URL", "http://db:7474"),
            ("NEO4J_PASSWORD", "s3cret"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::from_yaml(INLINE).unwrap();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        let database = config.database.unwrap();
        assert_eq!(database.url, "http://db:7474");
        assert_eq!(database.user, "neo4j");
        assert_eq!(database.password, "s3cret");
    }

    #[test]
    fn test_no_overrides_keeps_database_absent() {
        let mut config = PipelineConfig::from_yaml(INLINE).unwrap();
        config.apply_overrides(|_| None);
        assert!(config.database.is_none());
    }
}
