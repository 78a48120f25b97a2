//! Fabric controller entry point.
//!
//! Loads the configuration, starts the FabricDaemon and runs it until
//! Ctrl-C. Without a switch session layer attached, forwarding-state writes
//! are logged instead of sent.

use async_trait::async_trait;
use clap::Parser;
use fabric_orchagent::audit::{AuditCategory, AuditOutcome, AuditRecord};
use fabric_orchagent::audit_log;
use fabric_orchagent::flow::{FlowSpec, GroupId, GroupSpec, SwitchTransport, TransportError};
use fabric_orchagent::{FabricConfig, FabricDaemon, FabricNotification, NodeId};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// SDN fabric controller
#[derive(Parser, Debug)]
#[command(name = "fabricorch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Debounce window for topology rebuilds, overrides the config file
    #[arg(long)]
    refresh_delay_ms: Option<u64>,
}

/// Transport that only logs what it is asked to write.
struct LoggingTransport;

#[async_trait]
impl SwitchTransport for LoggingTransport {
    async fn install_flow(&self, flow: &FlowSpec) -> Result<(), TransportError> {
        info!("install flow {}", flow);
        Ok(())
    }

    async fn install_group(&self, group: &GroupSpec) -> Result<(), TransportError> {
        info!("install group {}/{} ports {:?}", group.node, group.group_id, group.ports());
        Ok(())
    }

    async fn update_group(&self, _original: &GroupSpec, updated: &GroupSpec) -> Result<(), TransportError> {
        info!("update group {}/{} ports {:?}", updated.node, updated.group_id, updated.ports());
        Ok(())
    }

    async fn remove_group(&self, node: &NodeId, group_id: GroupId) -> Result<(), TransportError> {
        info!("remove group {}/{}", node, group_id);
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<FabricConfig, fabric_orchagent::ConfigError> {
    let mut config = match &args.config {
        Some(path) => FabricConfig::from_file(path)?,
        None => FabricConfig::default(),
    };
    if let Some(delay) = args.refresh_delay_ms {
        config.topology_refresh_delay_ms = delay;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("Starting fabric controller");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            audit_log!(AuditRecord::new(AuditCategory::ConfigurationChange, "fabricorch", "load_config")
                .with_error(e.to_string()));
            return ExitCode::FAILURE;
        }
    };
    audit_log!(AuditRecord::new(AuditCategory::ConfigurationChange, "fabricorch", "load_config")
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "file": args.config.as_ref().map(|p| p.display().to_string()),
            "topology_refresh_delay_ms": config.topology_refresh_delay_ms,
            "heartbeat_interval_ms": config.heartbeat_interval_ms,
        })));

    info!("Topology refresh delay: {}ms", config.topology_refresh_delay_ms);
    info!("Heartbeat interval: {}ms", config.heartbeat_interval_ms);
    info!("Multicast rendezvous: {}:{}", config.multicast_address, config.mdns_port);

    let mut daemon = FabricDaemon::new(config, Arc::new(LoggingTransport));

    if let Some(mut notifications) = daemon.take_notifications() {
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                match notification {
                    FabricNotification::HostAdded { address, node } => {
                        info!("Host {} added at {}", address, node)
                    }
                    FabricNotification::HostRemoved(address) => info!("Host {} removed", address),
                    FabricNotification::RouteCompleted { request, result } => match result {
                        Ok(()) => info!("Route {} installed", request),
                        Err(e) => warn!("Route {} failed: {}", request, e),
                    },
                }
            }
        });
    }

    // Setup signal handling for graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    let shutdown_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down gracefully...");
                signal_token.cancel();
            }
            Err(err) => {
                error!("Failed to listen for ctrl-c: {}", err);
            }
        }
    });

    daemon.run(shutdown).await;
    shutdown_handle.abort();

    for line in daemon.dump() {
        info!("{}", line);
    }
    info!("Fabric controller shutdown complete");

    ExitCode::SUCCESS
}
