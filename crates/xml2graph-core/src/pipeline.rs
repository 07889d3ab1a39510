//! Parse, export and load orchestration.

use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::loader::{LoadOptions, LoadStats, Loader, MemoryStore, Neo4jHttpStore};
use crate::parser;
use crate::schema::Schema;

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub nodes: usize,
    pub edges: usize,
    /// Number of files written by the export step.
    pub exported: usize,
    /// Present when the load step ran.
    pub load: Option<LoadStats>,
    /// Whether the load targeted the in-memory store.
    pub dry_run: bool,
    pub duration_secs: f64,
}

/// Sequential parse → export → load run.
pub struct Pipeline {
    config: PipelineConfig,
    schema: Schema,
}

impl Pipeline {
    /// Validate `config` and resolve its schema.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let schema = config.load_schema()?;
        Ok(Self { config, schema })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Force the load step into the in-memory store.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.config.dry_run |= enabled;
        self
    }

    pub async fn run(&self) -> Result<PipelineReport> {
        let start = Instant::now();
        let mut report = PipelineReport {
            dry_run: self.config.dry_run,
            ..PipelineReport::default()
        };

        info!(input = %self.config.input.display(), "starting pipeline");

        let step = Instant::now();
        let graph = parser::parse(&self.config.input, &self.schema)?;
        report.nodes = graph.node_count();
        report.edges = graph.edge_count();
        info!(elapsed_ms = step.elapsed().as_millis() as u64, "parse step done");

        let export = &self.config.export;
        if export.gexf.is_some() || export.graphml.is_some() {
            let step = Instant::now();
            let exporter = Exporter::default().with_pagerank(export.pagerank);
            if let Some(path) = &export.gexf {
                exporter.export_gexf(&graph, path)?;
                report.exported += 1;
            }
            if let Some(path) = &export.graphml {
                exporter.export_graphml(&graph, path)?;
                report.exported += 1;
            }
            info!(elapsed_ms = step.elapsed().as_millis() as u64, "export step done");
        }

        let step = Instant::now();
        report.load = match (&self.config.database, self.config.dry_run) {
            (database, true) => {
                info!("dry run: loading into memory");
                let options = database
                    .as_ref()
                    .map(LoadOptions::from)
                    .unwrap_or_default();
                let mut loader = Loader::new(MemoryStore::new(), options);
                Some(loader.load(&graph).await?)
            }
            (Some(database), false) => {
                let store = Neo4jHttpStore::new(database.clone())?;
                let mut loader = Loader::new(store, LoadOptions::from(database));
                Some(loader.load(&graph).await?)
            }
            (None, false) => {
                info!("no database configured, skipping load");
                None
            }
        };
        if report.load.is_some() {
            info!(elapsed_ms = step.elapsed().as_millis() as u64, "load step done");
        }

        report.duration_secs = start.elapsed().as_secs_f64();
        info!(
            nodes = report.nodes,
            edges = report.edges,
            exported = report.exported,
            duration_secs = report.duration_secs,
            "pipeline finished"
        );
        Ok(report)
    }
}

impl TryFrom<PipelineConfig> for Pipeline {
    type Error = Error;

    fn try_from(config: PipelineConfig) -> Result<Self> {
        Self::new(config)
    }
}
