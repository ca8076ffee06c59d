//! Consumer service: applies log events to the shard fleet.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardline::{Applier, Config, ConsumerStatus, KafkaApplier, ShardRegistry, ShardSet};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = Config::from_env();

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    // Registry load is the only fatal startup error.
    let registry = ShardRegistry::load(&config.master_url()).await?;
    let shards = ShardSet::connect(&registry, config.shard_max_connections).await?;

    let status = Arc::new(ConsumerStatus::new());
    let applier = Applier::new(shards);
    let kafka = KafkaApplier::connect(&config.kafka_bootstrap_servers, applier, status.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = tokio::spawn(async move { kafka.run(shutdown_rx).await });

    let app = shardline::consumer::http::router(status)
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.consumer_port)).await?;
    info!(port = config.consumer_port, "Starting consumer service");

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    shutdown_signal().await;
    info!("Shutting down consumer service...");

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if tokio::time::timeout(grace, consumer_task).await.is_err() {
        warn!(grace_secs = config.shutdown_grace_secs, "Consumer did not drain within grace period");
    }

    let _ = server.await;
    info!("Consumer service stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
