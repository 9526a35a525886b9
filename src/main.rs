//! GitHub Billing Exporter
//!
//! Exposes GitHub organization billing (actions minutes, packages bandwidth,
//! shared storage) as Prometheus metrics.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use github_billing_exporter::collector::{BillingCollector, CollectorConfig, CollectorRegistry};
use github_billing_exporter::config::{Args, LogFormat, LogOutput};
use github_billing_exporter::github::GitHubClient;
use github_billing_exporter::server::{cancel_on, shutdown_signal, MetricsServer};

/// Time granted to open connections after shutdown was requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let orgs = args.orgs();
    info!("Starting GitHub billing exporter");
    info!("  GitHub API: {}", args.github_api_url);
    info!("  Organizations: {:?}", orgs);
    info!("  Collector timeout: {}s", args.collector_timeout_seconds);
    if orgs.is_empty() {
        warn!("No organization configured, only collector liveness will be exported");
    }

    let server_config = args.server_config().context("invalid web configuration")?;
    let github_config = args.github_config().context("invalid GitHub configuration")?;
    let collector_timeout = args.collector_timeout().context("invalid collector configuration")?;
    let client = GitHubClient::new(github_config).context("failed to create GitHub client")?;

    let mut registry = CollectorRegistry::with_defaults();
    args.select_collectors(&mut registry)
        .context("invalid collector selection")?;

    let cancel = CancellationToken::new();
    let collector = registry
        .instantiate(CollectorConfig::new(Arc::new(client), orgs), cancel.clone())
        .await
        .context("failed to create collectors")?
        .with_timeout(collector_timeout);
    collector.descs().context("invalid metric descriptors")?;
    let collector = Arc::new(collector);

    info!(
        "Enabled collectors: {}",
        collector.collector_names().collect::<Vec<_>>().join(", ")
    );

    if let Some(interval) = args.reload_interval() {
        tokio::spawn(reload_periodically(collector.clone(), interval, cancel.clone()));
    }

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = cancel_on(shutdown_signal(), shutdown).await {
            error!("Failed to listen for shutdown signals: {}", e);
        }
    });

    MetricsServer::new(server_config, collector)
        .run(cancel.clone())
        .await
        .context("metrics server failed")?;

    tokio::time::sleep(SHUTDOWN_GRACE).await;
    info!("Exporter shutdown complete");
    Ok(())
}

async fn reload_periodically(collector: Arc<BillingCollector>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; collectors were loaded at startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let failed = collector.reload(&cancel).await;
                if failed > 0 {
                    warn!("{} collector reloads failed", failed);
                }
            }
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let writer = match args.log_output {
        LogOutput::Stdout => fmt::writer::BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => fmt::writer::BoxMakeWriter::new(std::io::stderr),
    };

    match args.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(writer))
            .init(),
    }
}
