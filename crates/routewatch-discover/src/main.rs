//! CLI entry point for the routewatch-discover scanner.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use routewatch_core::ScanJobStatus;
use routewatch_store::{GraphClient, MemoryStore, PersistenceStore};

use routewatch_discover::config::{
    load_discover_config, load_graph_config, DiscoverConfig, StoreBackend,
};
use routewatch_discover::scheduler::ScanScheduler;
use routewatch_discover::{ScanOrchestrator, SshTunnel, StaticCredentials, Transport, TunnelSession};

#[derive(Parser)]
#[command(name = "routewatch-discover")]
#[command(about = "Discover routers and their OSPF neighbors over the RouterOS API")]
struct Cli {
    /// Target to scan (CIDR notation, e.g., 10.0.0.0/24).
    #[arg(short, long)]
    target: Option<String>,

    /// Run a single one-shot scan and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled scans.
    #[arg(long)]
    daemon: bool,

    /// Config file prefix (default: routewatch).
    #[arg(short, long, default_value = "routewatch")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    if !cli.once && !cli.daemon {
        anyhow::bail!("Specify --once (one-shot scan) or --daemon (scheduled scanning)");
    }
    let discover_config = load_discover_config(&cli.config)?;

    let store = open_store(&discover_config, &cli.config).await?;
    let tunnel = open_tunnel(&discover_config).await?;
    let transport = match &tunnel {
        Some(session) => Transport::tunneled(session.clone()),
        None => Transport::direct(discover_config.connect_timeout()),
    };

    let orchestrator = ScanOrchestrator::new(
        store,
        transport,
        Arc::new(StaticCredentials::new(discover_config.credentials.clone())),
    )
    .with_thresholds(discover_config.severity)
    .with_api_port(discover_config.api_port)
    .with_probe_timeout(discover_config.probe_timeout());

    let outcome = if cli.once {
        match cli.target.as_deref() {
            Some(target) => run_once(&orchestrator, target).await,
            None => Err(anyhow::anyhow!("--target is required in --once mode")),
        }
    } else {
        let sched = ScanScheduler::new(orchestrator, &discover_config);
        sched.run().await.map_err(Into::into)
    };

    if let Some(session) = tunnel {
        session.disconnect().await?;
    }
    outcome
}

/// Scan one subnet, log each progress event, print the final job.
async fn run_once(orchestrator: &ScanOrchestrator, target: &str) -> anyhow::Result<()> {
    let (job, mut progress) = orchestrator.start_scan_with_progress(target).await?;

    while let Some(event) = progress.next().await {
        tracing::info!(
            job_id = %event.job_id,
            percent = event.percent_complete,
            status = event.status.as_str(),
            routers = event.routers_found,
            address = event.current_address.as_deref().unwrap_or(""),
            "Scan progress"
        );
    }

    let finished = orchestrator
        .store()
        .get_scan_job(&job.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Scan job {} disappeared", job.id))?;
    println!("{}", serde_json::to_string_pretty(&finished)?);

    if finished.status == ScanJobStatus::Error {
        anyhow::bail!(
            "Scan failed: {}",
            finished.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn open_store(
    config: &DiscoverConfig,
    file_prefix: &str,
) -> anyhow::Result<Arc<dyn PersistenceStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Neo4j => {
            let graph = GraphClient::connect(&load_graph_config(file_prefix)).await?;
            tracing::info!("Connected to Neo4j");
            Ok(Arc::new(graph))
        }
    }
}

async fn open_tunnel(config: &DiscoverConfig) -> anyhow::Result<Option<Arc<SshTunnel>>> {
    let tunnel_config = &config.tunnel;
    if !tunnel_config.enabled {
        return Ok(None);
    }
    if tunnel_config.host.is_empty() {
        anyhow::bail!("discover.tunnel.host is required when the tunnel is enabled");
    }

    let tunnel = Arc::new(SshTunnel::from_config(tunnel_config));
    tunnel
        .connect(
            &tunnel_config.host,
            &tunnel_config.user,
            &tunnel_config.identity_file,
        )
        .await?;
    Ok(Some(tunnel))
}
