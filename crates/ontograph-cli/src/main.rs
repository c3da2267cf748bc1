//! Ontograph CLI
//!
//! Runs the ingestion pipeline over JSON files:
//! - Fingerprinting payloads the way type mappings select them
//! - Validating a payload against a list of property keys
//! - Dry-running a type mapping's transformations
//! - Ingesting payloads into an in-memory graph and reporting the result
//!
//! Machine-readable output goes to stdout; logs go to stderr.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ontograph_etl::{shape_hash_with, ShapeHashOptions, StagedData, Transformer, TypeMapping};
use ontograph_schema::{validate, GraphRecord, OntologySnapshot, PropertyKey};
use ontograph_storage::{Ingestor, MemoryGraph, MemoryOntology};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;

use config::{init_logging, CliConfig};

#[derive(Parser)]
#[command(name = "ontograph")]
#[command(author, version, about = "Ontograph: ontology-driven graph ingestion")]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// JSON config file (log level, ingest settings)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the shape fingerprint of a payload.
    Fingerprint {
        payload: PathBuf,
        /// Key dropped before hashing (repeatable)
        #[arg(long = "stop-node")]
        stop_nodes: Vec<String>,
        /// Key hashed by value instead of type (repeatable)
        #[arg(long = "value-node")]
        value_nodes: Vec<String>,
    },

    /// Validate a payload against property keys; prints the payload with
    /// defaults applied.
    Validate {
        /// JSON array of property keys
        #[arg(long)]
        keys: PathBuf,
        payload: PathBuf,
    },

    /// Run a mapping's transformations and print the produced records
    /// without writing anything.
    Transform {
        /// Ontology snapshot `{metatypes, relationships, pairs}`
        #[arg(long)]
        ontology: PathBuf,
        /// Type mapping
        #[arg(long)]
        mapping: PathBuf,
        payload: PathBuf,
    },

    /// Ingest payloads, in order, into an in-memory graph.
    Ingest {
        #[arg(long)]
        ontology: PathBuf,
        #[arg(long)]
        mapping: PathBuf,
        #[arg(required = true)]
        payloads: Vec<PathBuf>,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {what} {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {what} {}", path.display()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A mapping file may leave `shape_hash` out (taken from the sample
/// payload) and the transformations' container and mapping ids (taken from
/// the mapping).
fn load_mapping(path: &Path) -> Result<TypeMapping> {
    let mut mapping: TypeMapping = read_json(path, "mapping")?;
    if mapping.shape_hash.is_empty() {
        mapping.refresh_shape_hash();
    }
    for transformation in &mut mapping.transformations {
        if transformation.container_id.is_empty() {
            transformation.container_id = mapping.container_id.clone();
        }
        if transformation.type_mapping_id.is_none() {
            transformation.type_mapping_id = mapping.id.clone();
        }
    }
    Ok(mapping)
}

fn load_ontology(path: &Path, mapping: &TypeMapping) -> Result<Arc<MemoryOntology>> {
    let snapshot: OntologySnapshot = read_json(path, "ontology")?;
    Ok(Arc::new(MemoryOntology::from_snapshot(&mapping.container_id, snapshot)))
}

fn cmd_fingerprint(payload: &Path, stop_nodes: Vec<String>, value_nodes: Vec<String>) -> Result<()> {
    let value: Value = read_json(payload, "payload")?;
    let options = ShapeHashOptions {
        stop_nodes,
        value_nodes,
    };
    println!("{}", shape_hash_with(&value, &options));
    Ok(())
}

fn cmd_validate(keys: &Path, payload: &Path) -> Result<()> {
    let keys: Vec<PropertyKey> = read_json(keys, "keys")?;
    let value: Value = read_json(payload, "payload")?;

    match validate(&keys, &value) {
        Ok(properties) => print_json(&Value::Object(properties)),
        Err(err) => {
            eprintln!("{} {}", "Invalid".red().bold(), err);
            Err(anyhow!("{} does not satisfy {} keys", payload.display(), keys.len()))
        }
    }
}

async fn cmd_transform(ontology: &Path, mapping: &Path, payload: &Path) -> Result<()> {
    let mapping = load_mapping(mapping)?;
    let ontology = load_ontology(ontology, &mapping)?;
    let staged = StagedData::new(mapping.data_source_id.clone(), read_json(payload, "payload")?);

    if !mapping.matches(&staged.data) {
        eprintln!(
            "{} payload does not match mapping {} (inactive or different shape)",
            "Warning:".yellow().bold(),
            mapping.id.as_deref().unwrap_or("<unsaved>")
        );
    }

    let transformer = Transformer::new(ontology.as_ref());
    let mut results = Vec::new();
    for transformation in mapping.live_transformations() {
        let entry = match transformer.transform(transformation, &staged).await {
            Ok(output) => {
                let records: Vec<Value> = output
                    .records
                    .iter()
                    .map(|r| {
                        let record = match &r.record {
                            GraphRecord::Node(node) => serde_json::to_value(node),
                            GraphRecord::Edge(edge) => serde_json::to_value(edge),
                        };
                        record.map(|record| json!({ "index": r.index, "record": record }))
                    })
                    .collect::<Result<_, _>>()?;
                let errors: Vec<Value> = output
                    .errors
                    .iter()
                    .map(|e| json!({ "index": e.index, "error": e.error.to_string() }))
                    .collect();
                json!({
                    "transformation": transformation.id,
                    "records": records,
                    "errors": errors,
                })
            }
            Err(err) => json!({
                "transformation": transformation.id,
                "error": err.to_string(),
            }),
        };
        results.push(entry);
    }

    print_json(&Value::Array(results))
}

async fn cmd_ingest(config: &CliConfig, ontology: &Path, mapping: &Path, payloads: &[PathBuf]) -> Result<()> {
    let mapping = load_mapping(mapping)?;
    let ontology = load_ontology(ontology, &mapping)?;
    let graph = MemoryGraph::new();
    let ingestor = Ingestor::with_config(graph.clone(), ontology, config.ingest.clone());

    let mut reports = Vec::new();
    for path in payloads {
        let staged = StagedData::new(mapping.data_source_id.clone(), read_json(path, "payload")?);
        let report = ingestor
            .ingest(&mapping, &staged)
            .await
            .with_context(|| format!("ingesting {}", path.display()))?;
        eprintln!(
            "{} {}: {} nodes, {} edges, {} failures",
            "Ingested".green().bold(),
            path.display(),
            report.nodes.len(),
            report.edges.len(),
            report.failures.len()
        );
        reports.push(serde_json::to_value(&report)?);
    }

    print_json(&json!({
        "reports": reports,
        "graph": {
            "nodes": graph.nodes().await,
            "edges": graph.edges().await,
        },
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "warn".to_string());
    init_logging(&level);

    match cli.command {
        Commands::Fingerprint {
            payload,
            stop_nodes,
            value_nodes,
        } => cmd_fingerprint(&payload, stop_nodes, value_nodes),
        Commands::Validate { keys, payload } => cmd_validate(&keys, &payload),
        Commands::Transform {
            ontology,
            mapping,
            payload,
        } => cmd_transform(&ontology, &mapping, &payload).await,
        Commands::Ingest {
            ontology,
            mapping,
            payloads,
        } => cmd_ingest(&config, &ontology, &mapping, &payloads).await,
    }
}
