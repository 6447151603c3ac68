mod config;
mod planner;
mod rpc;
mod scoring;
mod state;
mod stops;
mod tfl;

use std::path::Path;
use std::sync::Arc;

use optimaldn_common::broker::Broker;
use optimaldn_common::routing::ROUTE_EXCHANGE;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use planner::Planner;
use state::RouteStore;
use stops::StopCodes;
use tfl::TflClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    info!("starting route planner service");
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database ready");

    let stops = StopCodes::load(Path::new(&config.stop_codes_path))?;
    info!(
        path = %config.stop_codes_path,
        entries = stops.len(),
        "stop-code table loaded"
    );

    let broker = Broker::connect(&config.broker_url).await?;
    broker.declare_exchange(ROUTE_EXCHANGE).await?;
    let publisher = broker.publisher(ROUTE_EXCHANGE);

    let tfl = TflClient::new(config.tfl_api_key.clone())?;
    let planner = Arc::new(Planner::new(
        stops,
        tfl,
        RouteStore::new(pool),
        publisher,
    ));

    let token = CancellationToken::new();
    let app = rpc::router(planner);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!(port = %config.port, "route planner RPC listening");

    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let shutdown_token = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    broker.close().await;
    info!("route planner shut down cleanly");
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
