use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use xml2graph_core::{
    ConnectionConfig, Exporter, Graph, LoadStats, Pipeline, PipelineConfig, PipelineReport,
    Schema, SchemaSource, load, parse,
};

const DIVIDER: &str = "─────────────────────────────────────────────────────────────";
const LABEL_WIDTH: usize = 16;

#[derive(Parser)]
#[command(name = "xml2graph")]
#[command(version)]
#[command(about = "Convert XML documents into property graphs (GEXF, GraphML, Neo4j)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run parse, export and load from a pipeline file
    Run {
        /// Pipeline configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Load into memory instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse a document and print a summary of the graph
    Parse {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the graph as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Parse a document and write GEXF and/or GraphML files
    Export {
        #[command(flatten)]
        source: SourceArgs,

        /// GEXF output path
        #[arg(long, value_name = "FILE")]
        gexf: Option<PathBuf>,

        /// GraphML output path
        #[arg(long, value_name = "FILE")]
        graphml: Option<PathBuf>,

        /// Add a PageRank column to GEXF nodes
        #[arg(long)]
        pagerank: bool,
    },

    /// Parse a document and upsert it into Neo4j
    Load {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Check a schema or pipeline file without reading any document
    Validate {
        /// Schema file
        #[arg(short, long, value_name = "FILE", conflicts_with = "config", required_unless_present = "config")]
        schema: Option<PathBuf>,

        /// Pipeline configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Schema file mapping elements to nodes and edges
    #[arg(short, long, value_name = "FILE")]
    schema: PathBuf,

    /// XML document
    #[arg(value_name = "INPUT")]
    input: PathBuf,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Neo4j HTTP URL
    #[arg(long, env = "NEO4J_URL")]
    url: String,

    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    user: String,

    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,

    #[arg(long, env = "NEO4J_DATABASE", default_value = "neo4j")]
    database: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Rows per upsert request
    #[arg(long, default_value_t = 500)]
    batch_size: usize,
}

impl ConnectionArgs {
    fn into_config(self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.url, self.user, self.password);
        config.database = self.database;
        config.timeout_secs = self.timeout;
        config.batch_size = self.batch_size;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { config, dry_run } => {
            let mut pipeline_config = PipelineConfig::from_file(&config)
                .with_context(|| format!("failed to read {}", config.display()))?;
            pipeline_config.apply_env();
            let report = Pipeline::new(pipeline_config)
                .context("invalid pipeline configuration")?
                .dry_run(dry_run)
                .run()
                .await
                .context("pipeline failed")?;
            print!("{}", render_report(&report));
        }
        Commands::Parse { source, json } => {
            let graph = parse_source(&source)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&graph)?);
            } else {
                print!("{}", render_graph(&source.input, &graph));
            }
        }
        Commands::Export {
            source,
            gexf,
            graphml,
            pagerank,
        } => {
            if gexf.is_none() && graphml.is_none() {
                return Err(anyhow!("nothing to export: pass --gexf and/or --graphml"));
            }
            let graph = parse_source(&source)?;
            let exporter = Exporter::default().with_pagerank(pagerank);
            if let Some(path) = &gexf {
                exporter
                    .export_gexf(&graph, path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Wrote {}", path.display());
            }
            if let Some(path) = &graphml {
                exporter
                    .export_graphml(&graph, path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Wrote {}", path.display());
            }
        }
        Commands::Load { source, connection } => {
            let graph = parse_source(&source)?;
            let config = connection.into_config();
            let stats = load(&graph, &config)
                .await
                .with_context(|| format!("failed to load into {}", config.url))?;
            print!("{}", render_load(&stats));
        }
        Commands::Validate { schema, config } => {
            if let Some(path) = schema {
                let schema = Schema::from_file(&path)
                    .with_context(|| format!("invalid schema {}", path.display()))?;
                println!(
                    "{} is valid ({} entity rules, {} relationship rules)",
                    path.display(),
                    schema.entities.len(),
                    schema.relationships.len()
                );
            } else if let Some(path) = config {
                let pipeline_config = PipelineConfig::from_file(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                pipeline_config
                    .validate()
                    .with_context(|| format!("invalid pipeline {}", path.display()))?;
                if let SchemaSource::Path(_) = pipeline_config.schema {
                    pipeline_config
                        .load_schema()
                        .context("invalid schema referenced by pipeline")?;
                }
                println!("{} is valid", path.display());
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_source(source: &SourceArgs) -> Result<Graph> {
    let schema = Schema::from_file(&source.schema)
        .with_context(|| format!("invalid schema {}", source.schema.display()))?;
    parse(&source.input, &schema).with_context(|| format!("failed to parse {}", source.input.display()))
}

fn push_section_header(buf: &mut String, icon: &str, title: &str) {
    let _ = writeln!(buf, "{DIVIDER}");
    let _ = writeln!(buf, "{icon} {title}");
    let _ = writeln!(buf, "{DIVIDER}");
}

fn push_key_value(buf: &mut String, label: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let _ = writeln!(buf, "• {:<width$} : {}", label, value, width = LABEL_WIDTH);
}

fn render_graph(input: &Path, graph: &Graph) -> String {
    let mut output = String::new();
    push_section_header(&mut output, "🕸️", &format!("Graph: {}", input.display()));
    push_key_value(&mut output, "Nodes", &graph.node_count().to_string());
    push_key_value(&mut output, "Edges", &graph.edge_count().to_string());

    let placeholders = graph.nodes().filter(|n| n.is_placeholder()).count();
    if placeholders > 0 {
        push_key_value(&mut output, "Placeholders", &placeholders.to_string());
    }

    let mut node_labels: Vec<(String, usize)> = Vec::new();
    for node in graph.nodes() {
        let label = node.label.as_deref().unwrap_or("(unlabelled)");
        count_label(&mut node_labels, label);
    }
    let mut edge_labels: Vec<(String, usize)> = Vec::new();
    for edge in graph.edges() {
        count_label(&mut edge_labels, &edge.label);
    }

    push_key_value(&mut output, "Node labels", &format_counts(&node_labels));
    push_key_value(&mut output, "Edge labels", &format_counts(&edge_labels));
    let _ = writeln!(&mut output);
    output
}

fn count_label(counts: &mut Vec<(String, usize)>, label: &str) {
    match counts.iter_mut().find(|(name, _)| name == label) {
        Some((_, count)) => *count += 1,
        None => counts.push((label.to_string(), 1)),
    }
}

fn format_counts(counts: &[(String, usize)]) -> String {
    counts
        .iter()
        .map(|(label, count)| format!("{label} ({count})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_load(stats: &LoadStats) -> String {
    let mut output = String::new();
    push_section_header(&mut output, "🗄️", "Database Load");
    push_key_value(&mut output, "Nodes upserted", &stats.nodes.to_string());
    push_key_value(&mut output, "Edges upserted", &stats.edges.to_string());
    push_key_value(&mut output, "Batches", &stats.batches.to_string());
    let _ = writeln!(&mut output);
    output
}

fn render_report(report: &PipelineReport) -> String {
    let mut output = String::new();
    push_section_header(&mut output, "📦", "Pipeline");
    push_key_value(&mut output, "Nodes", &report.nodes.to_string());
    push_key_value(&mut output, "Edges", &report.edges.to_string());
    push_key_value(&mut output, "Files written", &report.exported.to_string());
    push_key_value(&mut output, "Duration", &format!("{:.2}s", report.duration_secs));
    let _ = writeln!(&mut output);

    match &report.load {
        Some(stats) => {
            output.push_str(&render_load(stats));
            if report.dry_run {
                let _ = writeln!(&mut output, "Dry run: nothing was written to the database.");
            }
        }
        None => {
            let _ = writeln!(&mut output, "No database configured; load skipped.");
        }
    }
    output
}
