use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use xrm_config::RelayConfig;
use xrm_correlator::Correlator;
use xrm_daemon::{ip_map_from_config, report_stats, run_collector, run_shoveler};
use xrm_publisher::{PublisherConfig, PublisherPool};
use xrm_queue::{DurableQueue, DEFAULT_LOW_WATER, DEFAULT_MAX_IN_MEMORY};
use xrm_telemetry::Counters;

#[derive(Parser, Debug)]
#[command(name = "xrm-daemon", version, about = "XRootD monitoring relay")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    xrm_telemetry::init_tracing(args.debug);

    let mut config = xrm_config::load_config(args.config.as_deref())
        .with_context(|| "loading relay configuration")?;
    xrm_config::apply_env_overrides(&mut config);
    let warnings = xrm_config::validate_config(&config).with_context(|| "validating relay configuration")?;

    for warning in &warnings {
        tracing::warn!(target: "relay.daemon", %warning, "configuration warning");
    }
    tracing::info!(target: "relay.daemon", mode = %config.mode, listen = %format!("{}:{}", config.listen.ip, config.listen.port), "starting");

    let counters = Counters::new();
    let cancel = CancellationToken::new();

    let queue = Arc::new(
        DurableQueue::open(config.queue_directory.clone(), DEFAULT_MAX_IN_MEMORY, DEFAULT_LOW_WATER)
            .await
            .with_context(|| format!("opening queue directory {}", config.queue_directory))?,
    );

    let token_path = config.amqp.token_location.clone().map(PathBuf::from);
    let url_rx = xrm_publisher::resolve_and_watch(config.amqp.url.clone(), token_path, cancel.clone())
        .context("resolving amqp credentials")?;

    let workers = if config.mode == "shoveler" { 1 } else { config.amqp.publish_workers.max(1) };
    let pool = PublisherPool::new(
        PublisherConfig {
            workers,
            default_exchange: config.amqp.exchange.clone(),
        },
        Arc::clone(&queue),
        url_rx,
        cancel.clone(),
    );
    let pool_stats = pool.stats();

    let socket = Arc::new(
        UdpSocket::bind((config.listen.ip.as_str(), config.listen.port))
            .await
            .with_context(|| format!("binding udp {}:{}", config.listen.ip, config.listen.port))?,
    );

    let pool_task = tokio::spawn(async move { pool.run().await });
    let stats_task = tokio::spawn(report_stats(
        Arc::clone(&queue),
        pool_stats,
        counters.clone(),
        cancel.clone(),
    ));

    let ingress_task = if config.mode == "shoveler" {
        let ip_map = ip_map_from_config(&config.map);
        let default_exchange = config.amqp.exchange.clone();
        tokio::spawn(run_shoveler(socket, queue, default_exchange, ip_map, config.verify, counters.clone(), cancel.clone()))
    } else {
        let correlator = Arc::new(Correlator::new(
            Duration::from_secs(config.state.entry_ttl),
            config.state.max_entries,
        ));
        tokio::spawn(run_collector(socket, queue, correlator, config.amqp.clone(), counters.clone(), cancel.clone()))
    };

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!(target: "relay.daemon", "shutdown signal received, draining");
    cancel.cancel();

    let _ = ingress_task.await;
    let _ = stats_task.await;
    let _ = pool_task.await;

    Ok(())
}
