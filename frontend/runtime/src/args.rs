use crate::{admin::Admin, api::Api, clusters::Clusters, operations::Tracker, server, FrontendConfig};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use rp_frontend_changefeed::{
    CacheMetrics, EnabledVersions, LastSync, RoleSets, Synchronizer,
};
use rp_frontend_database::{MemoryDatabase, RetryPolicy};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::watch, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(name = "rp-frontend", about = "The resource provider frontend")]
pub struct Args {
    #[clap(long, default_value = "rp_frontend=info,warn", env = "RP_FRONTEND_LOG")]
    log_level: String,

    #[clap(long, value_enum, default_value = "plain")]
    log_format: LogFormat,

    #[clap(long, default_value = "0.0.0.0:8443")]
    addr: SocketAddr,

    #[clap(long, default_value = "0.0.0.0:9990")]
    admin_addr: SocketAddr,

    /// The Azure region served by this frontend.
    #[clap(long, env = "LOCATION")]
    location: String,

    #[clap(long, default_value = "Microsoft.RedHatOpenShift")]
    resource_provider_namespace: String,

    /// Seconds between change feed passes of each reference data cache.
    #[clap(long, default_value = "10")]
    changefeed_interval_secs: u64,

    /// Attempts made at a conditional update before reporting a conflict.
    #[clap(long, default_value = "10")]
    retry_max_attempts: usize,

    /// Backoff before the first retry of a conditional update. Doubles on every retry.
    #[clap(long, default_value = "10")]
    retry_backoff_ms: u64,

    /// Permits installing any valid semantic version.
    #[clap(long)]
    local_development: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            addr,
            admin_addr,
            location,
            resource_provider_namespace,
            changefeed_interval_secs,
            retry_max_attempts,
            retry_backoff_ms,
            local_development,
        } = self;

        init_tracing(&log_level, log_format)?;

        if location.is_empty() {
            bail!("--location must not be empty");
        }
        let mut config = FrontendConfig::new(&location, resource_provider_namespace);
        config.local_development = local_development;
        config.retry = RetryPolicy {
            max_attempts: retry_max_attempts,
            initial_backoff: Duration::from_millis(retry_backoff_ms),
            ..RetryPolicy::default()
        };
        let config = Arc::new(config);

        // No remote store client is linked into this binary; documents live in process memory.
        let store = MemoryDatabase::new();
        let db = store.database(config.retry);

        let mut prom = <Registry>::default();
        let metrics = CacheMetrics::register(prom.sub_registry_with_prefix("changefeed"));

        // Spawn the change feed synchronizers that maintain the reference data caches.
        let shutdown = CancellationToken::new();
        let interval = Duration::from_secs(changefeed_interval_secs);

        let versions = EnabledVersions::shared();
        let (sync, versions_synced) = Synchronizer::new(
            "openshiftversions",
            db.open_shift_versions.change_feed(),
            versions.clone(),
            interval,
            metrics.clone(),
        );
        tokio::spawn(
            sync.run(shutdown.clone())
                .instrument(info_span!("openshiftversions")),
        );

        let role_sets = RoleSets::shared();
        let (sync, role_sets_synced) = Synchronizer::new(
            "platformworkloadidentityrolesets",
            db.platform_workload_identity_role_sets.change_feed(),
            role_sets.clone(),
            interval,
            metrics,
        );
        tokio::spawn(
            sync.run(shutdown.clone())
                .instrument(info_span!("platformworkloadidentityrolesets")),
        );

        let (ready_tx, ready_rx) = watch::channel(false);
        tokio::spawn(ready(vec![versions_synced, role_sets_synced], ready_tx));

        let tracker = Tracker::new(
            db.open_shift_clusters.clone(),
            db.async_operations.clone(),
            config.clone(),
        );
        let clusters = Clusters::new(db, tracker.clone(), versions.clone(), config.clone());
        let api = Api::new(clusters, tracker, versions, role_sets, config);
        let admin = Admin::new(ready_rx, Arc::new(prom));

        let (drain_tx, drain_rx) = drain::channel();
        let api_listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let admin_listener = TcpListener::bind(admin_addr)
            .await
            .with_context(|| format!("failed to bind {admin_addr}"))?;
        let api_task = tokio::spawn(
            server::serve(api_listener, api, drain_rx.clone()).instrument(info_span!("api")),
        );
        let admin_task = tokio::spawn(
            server::serve(admin_listener, admin, drain_rx).instrument(info_span!("admin")),
        );

        // Block the main task on the shutdown signal. Once it fires, stop the synchronizers and
        // wait for in-flight requests to complete before exiting.
        shutdown_signal().await?;
        info!("Shutting down");
        shutdown.cancel();
        drain_tx.drain().await;

        api_task.await??;
        admin_task.await??;
        Ok(())
    }
}

fn init_tracing(log_level: &str, log_format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let res = match log_format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    res.map_err(|e| anyhow::anyhow!(e))
}

/// Marks the process ready once every cache has completed its first pass.
async fn ready(synced: Vec<LastSync>, tx: watch::Sender<bool>) {
    for mut rx in synced {
        if rx.wait_for(Option::is_some).await.is_err() {
            return;
        }
    }
    info!("Reference data caches populated");
    let _ = tx.send(true);
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
