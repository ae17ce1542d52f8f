//! Prometheus exporter for OpenConfig streaming telemetry.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use openconfig_telemetry_exporter::config::LogFormat;
use openconfig_telemetry_exporter::metric::MetricAssembler;
use openconfig_telemetry_exporter::{
    Collector, Config, GrpcTransport, HttpServer, StreamSession, Tree,
};

/// Prometheus exporter for OpenConfig streaming telemetry.
#[derive(Parser, Debug)]
#[command(name = "openconfig-telemetry-exporter")]
#[command(about = "Export OpenConfig streaming telemetry as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = "exporter.json5")]
    config: String,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load_from_file(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen_address = listen;
    }

    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env()
        .add_directive(config.logging.level.parse()?)
        .add_directive(format!("openconfig_telemetry_exporter={}", log_level).parse()?);

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    info!(config = %args.config, "Starting OpenConfig telemetry exporter");

    let listen_addr = config
        .listen_address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let collector = Arc::new(Collector::new());
    let mapping = Arc::new(config.string_value_mapping.clone());

    // One session task per target; each registers its tree with the
    // collector and receives its own stop signal from it.
    let mut sessions = JoinSet::new();
    for target in &config.targets {
        let tree = Arc::new(Tree::new(target.hostname.clone()));
        let assembler = Arc::new(MetricAssembler::new(mapping.clone()));
        let stop = collector.register(tree.clone(), assembler);

        let transport = GrpcTransport::new(target);
        let session = StreamSession::new(target, transport, tree);

        info!(device = %target.hostname, port = target.port, "starting session");
        sessions.spawn(session.run(stop));
    }

    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.metrics_path.clone(),
    );
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).expect("failed to install SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    collector.stop();
    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        while sessions.join_next().await.is_some() {}
        let _ = http_task.await;
    })
    .await;

    info!(devices = collector.device_count(), "Exporter stopped");
    Ok(())
}
