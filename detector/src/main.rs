mod config;
mod influx;
mod monitor;
mod queries;

use optimaldn_common::broker::Broker;
use optimaldn_common::routing::TRAFFIC_EXCHANGE;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use influx::InfluxClient;
use monitor::DelayMonitor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("starting traffic delay detector");
    let config = Config::from_env()?;

    let influx = InfluxClient::new(&config.influx)?;
    info!(url = %config.influx.url, "time-series query client initialized");

    let broker = Broker::connect(&config.broker_url).await?;
    broker.declare_exchange(TRAFFIC_EXCHANGE).await?;
    let publisher = broker.publisher(TRAFFIC_EXCHANGE);

    let token = CancellationToken::new();
    let monitor = DelayMonitor::new(influx, publisher, config.influx.bucket.clone());
    let monitor_token = token.clone();
    let monitor_task = tokio::spawn(async move { monitor.run(monitor_token).await });

    shutdown_signal().await;
    info!("shutdown signal received");
    token.cancel();
    monitor_task.await?;

    broker.close().await;
    info!("detector shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
