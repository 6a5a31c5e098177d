use anyhow::Result;
use netwatch::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::debug!(
        stale_connection_grace_secs = app_config.monitoring.stale_connection_grace_secs,
        "stale connection grace period is not applied; unseen connections are dropped each tick"
    );

    let engine = monitor::MonitorEngine::new(
        monitor::Sources {
            counters: Box::new(sampler::counters::SysinfoCounters::new()),
            processes: Box::new(sampler::process::CommandProcessSampler::from_config(
                &app_config.process_sampler,
            )),
            connections: Box::new(sampler::connections::ProcNetConnections::new()),
        },
        app_config.monitoring.history_length,
    );
    let reader = engine.reader();
    let broadcaster = Arc::new(broadcaster::Broadcaster::new(
        app_config.publishing.subscriber_buffer,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler_handle = worker::spawn(
        worker::SchedulerDeps {
            engine,
            broadcaster: broadcaster.clone(),
            shutdown_rx,
        },
        worker::SchedulerConfig {
            tick_interval_ms: app_config.monitoring.tick_interval_ms,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
        },
    );
    tracing::info!(
        tick_interval_ms = app_config.monitoring.tick_interval_ms,
        "Network monitoring started"
    );

    let app = routes::app(reader, broadcaster, &app_config);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Received shutdown signal");
            // Stop ticking and close subscribers so open sockets can drain.
            let _ = shutdown_tx.send(());
            if let Err(e) = scheduler_handle.await {
                tracing::warn!(error = %e, "scheduler task join failed");
            }
            tracing::info!("Network monitoring stopped");
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
