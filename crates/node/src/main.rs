//! quorumkv-node: entry point for a quorumkv peer.
//!
//! Loads config, builds the hash ring from the configured peer list,
//! wires the store to the HTTP peer client, spawns the health monitor,
//! then serves the HTTP surface until Ctrl+C.

use quorumkv_config::NodeConfig;
use quorumkv_net::HttpPeerClient;
use quorumkv_ring::RingManager;
use quorumkv_store::{HealthMonitor, ReplicationParams, Store};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::time::Duration;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Parse `-config <path>` plus the flag overrides `-port <int>`,
/// `-nodes <csv>`, `-replicationFactor <int>` (double-dash spellings
/// accepted too). Flags win over the config file.
fn parse_args(args: &[String]) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    let mut config = NodeConfig::default();
    if let Some(i) = args.iter().position(|a| a.trim_start_matches('-') == "config") {
        let path = args
            .get(i + 1)
            .ok_or("missing value for -config")?;
        config = quorumkv_config::load_from_file(std::path::Path::new(path))?;
    }

    let mut i = 0;
    while i < args.len() {
        match args[i].trim_start_matches('-') {
            "config" => i += 2,
            "port" => {
                config.port = flag_value(args, i)?.parse()?;
                i += 2;
            }
            "nodes" => {
                config.peers = quorumkv_config::parse_peer_list(flag_value(args, i)?);
                i += 2;
            }
            "replicationFactor" | "replication-factor" => {
                config.replication_factor = flag_value(args, i)?.parse()?;
                i += 2;
            }
            _ => return Err(format!("unknown flag: {}", args[i]).into()),
        }
    }

    config.validate()?;
    Ok(config)
}

fn flag_value<'a>(args: &'a [String], i: usize) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("missing value for {}", args[i]))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Usage: quorumkv-node [-config <path>] [-port <int>] [-nodes <csv>] [-replicationFactor <int>]"
            );
            std::process::exit(1);
        }
    };

    let params = ReplicationParams::for_cluster(config.peers.len(), config.replication_factor);
    tracing::info!(
        port = config.port,
        peers = config.peers.len(),
        replication_factor = params.replication_factor,
        write_quorum = params.write_quorum,
        "starting node"
    );

    let ring = Arc::new(RwLock::new(RingManager::new(&config.peers)));
    let client = Arc::new(HttpPeerClient::new(Duration::from_millis(
        config.request_timeout_ms,
    ))?);
    let store = Arc::new(Store::new(ring.clone(), client.clone(), params));

    HealthMonitor::new(
        config.peers.clone(),
        ring,
        client,
        Duration::from_secs(config.probe_interval_secs),
    )
    .spawn();

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    quorumkv_net::serve(listener, store, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
            Err(e) => tracing::warn!(error = %e, "failed to listen for shutdown signal"),
        }
    })
    .await?;

    tracing::info!("server stopped");
    Ok(())
}
