//! CLI entry point for the routewatch topology views.
//!
//! Reads the device set from Neo4j and writes JSON to stdout.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use routewatch_core::SeverityThresholds;
use routewatch_store::{GraphClient, GraphConfig, PersistenceStore};
use routewatch_topology::TopologyEngine;

#[derive(Parser)]
#[command(name = "routewatch-topology")]
#[command(about = "Topology and asymmetric routing views over discovered routers")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: routewatch).
    #[arg(short, long, default_value = "routewatch", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Print the router adjacency graph.
    Graph,
    /// Print links whose directional OSPF costs differ.
    Asymmetries,
    /// Print stored scan jobs, newest first.
    Jobs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config);

    let graph = GraphClient::connect(&settings.graph).await?;
    let store: Arc<dyn PersistenceStore> = Arc::new(graph);
    let engine = TopologyEngine::new(store.clone()).with_thresholds(settings.thresholds);

    match cli.command {
        Command::Graph => {
            let topology = engine.topology().await?;
            println!("{}", serde_json::to_string(&topology)?);
        }
        Command::Asymmetries => {
            let routes = engine.asymmetric_routes().await?;
            println!("{}", serde_json::to_string(&routes)?);
        }
        Command::Jobs => {
            let jobs = store.list_scan_jobs().await?;
            println!("{}", serde_json::to_string(&jobs)?);
        }
    }

    Ok(())
}

struct Settings {
    graph: GraphConfig,
    thresholds: SeverityThresholds,
}

fn load_settings(file_prefix: &str) -> Settings {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("ROUTEWATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build();

    match cfg {
        Ok(c) => Settings {
            graph: GraphConfig {
                uri: c
                    .get_string("neo4j.uri")
                    .unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
                user: c
                    .get_string("neo4j.user")
                    .unwrap_or_else(|_| "neo4j".to_string()),
                password: c
                    .get_string("neo4j.password")
                    .unwrap_or_else(|_| "routewatch-dev".to_string()),
                ..Default::default()
            },
            thresholds: c
                .get::<SeverityThresholds>("discover.severity")
                .unwrap_or_default(),
        },
        Err(_) => Settings {
            graph: GraphConfig::default(),
            thresholds: SeverityThresholds::default(),
        },
    }
}
