//! Nodeplane control plane
//!
//! Accepts node agents over WebSocket, keeps their live configuration in
//! step with the database and answers commands issued against them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use nodeplane_control::{Dispatcher, DispatcherConfig, Reconciler, ResyncSweep, SweepConfig};
use nodeplane_transport_websocket::{
    node_router, NodeAcceptor, NodeHandshake, WebSocketChannel, WebSocketSource, NODE_WS_PATH,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "nodeplane",
    about = "Control plane for relay nodes",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("NODEPLANE_COMMIT"), " ", env!("NODEPLANE_BUILT"), ")")
)]
struct Cli {
    /// Address node agents connect to
    #[arg(
        short = 'l',
        long,
        default_value = "0.0.0.0:9443",
        env = "NODEPLANE_LISTEN"
    )]
    listen: SocketAddr,

    /// Database URL (sqlite://nodeplane.db?mode=rwc, postgres://...)
    #[arg(
        long,
        default_value = "sqlite://nodeplane.db?mode=rwc",
        env = "NODEPLANE_DATABASE_URL"
    )]
    database_url: String,

    /// Deadline for a single node command, in milliseconds
    #[arg(long, default_value = "10000", env = "NODEPLANE_COMMAND_TIMEOUT_MS")]
    command_timeout_ms: u64,

    /// Commands a node may have awaiting a response before new ones are refused
    #[arg(long, default_value = "64", env = "NODEPLANE_MAX_IN_FLIGHT")]
    max_in_flight: usize,

    /// Push the full configuration to a node whenever it connects
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "NODEPLANE_RESYNC_ON_CONNECT"
    )]
    resync_on_connect: bool,

    /// Reconcile every connected node this often, in seconds (0 = off)
    #[arg(long, default_value = "0", env = "NODEPLANE_RESYNC_INTERVAL_SECS")]
    resync_interval_secs: u64,

    /// Enable verbose logging
    #[arg(short, long, env = "NODEPLANE_VERBOSE")]
    verbose: bool,
}

/// Binds authenticated WebSocket sessions to the reconciler
struct NodeGateway {
    reconciler: Arc<Reconciler>,
}

#[async_trait]
impl NodeAcceptor for NodeGateway {
    async fn authorize(&self, handshake: &NodeHandshake) -> bool {
        let Some(secret) = handshake.secret.as_deref() else {
            return false;
        };
        match self.reconciler.authenticate_node(handshake.id, secret).await {
            Ok(valid) => valid,
            Err(e) => {
                error!(node_id = handshake.id, error = %e, "Node authentication failed");
                false
            }
        }
    }

    async fn attach(
        &self,
        handshake: NodeHandshake,
        channel: WebSocketChannel,
        source: WebSocketSource,
    ) {
        self.reconciler
            .node_connected(handshake.id, handshake.version, channel, source)
            .await;
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose {
        "nodeplane=debug,nodeplane_control=debug,nodeplane_transport_websocket=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!(
        commit = env!("NODEPLANE_COMMIT"),
        "Starting nodeplane {}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Database: {}", cli.database_url);

    let db = nodeplane_db::connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;
    nodeplane_db::migrate(&db)
        .await
        .context("Failed to run database migrations")?;
    info!("Database ready");

    let default_timeout = Duration::from_millis(cli.command_timeout_ms);
    if default_timeout.is_zero() {
        anyhow::bail!("--command-timeout-ms must be greater than zero");
    }
    let defaults = DispatcherConfig::default();
    let dispatcher_config = DispatcherConfig {
        default_timeout,
        max_timeout: defaults.max_timeout.max(default_timeout),
        max_in_flight: cli.max_in_flight.max(1),
    };

    let sweep_config = SweepConfig {
        resync_on_connect: cli.resync_on_connect,
        interval: Duration::from_secs(cli.resync_interval_secs),
    };
    if !sweep_config.sweep_enabled() {
        warn!("Resync sweep disabled; nodes are only reconciled on connect or by operator action");
    }

    let dispatcher = Arc::new(Dispatcher::new(dispatcher_config));
    let reconciler = Arc::new(Reconciler::new(db, dispatcher.clone(), sweep_config));

    let sweep = ResyncSweep::new(reconciler.clone()).spawn();

    let app = node_router(Arc::new(NodeGateway {
        reconciler: reconciler.clone(),
    }));
    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    info!("Accepting node agents on ws://{}{}", cli.listen, NODE_WS_PATH);

    let shutdown_dispatcher = dispatcher.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            if let Some(handle) = sweep {
                handle.abort();
            }
            // Closing node sockets lets their connections drain
            shutdown_dispatcher.shutdown().await;
        })
        .await
        .context("Node listener failed")?;

    info!("Nodeplane stopped");

    Ok(())
}
