mod config;
mod handlers;
mod subscriptions;

use std::sync::Arc;

use optimaldn_common::broker::Broker;
use optimaldn_common::routing::{
    BIND_ROUTE_EVENTS, BIND_TRAFFIC_ALERTS, NOTIFICATIONS_EXCHANGE, ROUTE_EVENTS_QUEUE,
    ROUTE_EXCHANGE, TRAFFIC_EXCHANGE, TRAFFIC_QUEUE,
};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use handlers::{RouteEventsHandler, TrafficHandler};
use subscriptions::{PostgresSubscriptionStore, SubscriptionIndex, SWEEP_INTERVAL};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    info!("starting notification service");
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database ready");

    let broker = Broker::connect(&config.broker_url).await?;
    broker.declare_exchange(NOTIFICATIONS_EXCHANGE).await?;
    broker.declare_exchange(TRAFFIC_EXCHANGE).await?;
    broker.declare_exchange(ROUTE_EXCHANGE).await?;
    broker
        .declare_and_bind(TRAFFIC_QUEUE, BIND_TRAFFIC_ALERTS, TRAFFIC_EXCHANGE)
        .await?;
    broker
        .declare_and_bind(ROUTE_EVENTS_QUEUE, BIND_ROUTE_EVENTS, ROUTE_EXCHANGE)
        .await?;

    let index = Arc::new(SubscriptionIndex::new(PostgresSubscriptionStore::new(pool)));
    let publisher = Arc::new(broker.publisher(NOTIFICATIONS_EXCHANGE));
    info!("subscription index and cache initialized");

    let token = CancellationToken::new();

    let sweeper_index = index.clone();
    let sweeper_token = token.clone();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = sweeper_token.cancelled() => return,
                _ = interval.tick() => sweeper_index.sweep_expired(),
            }
        }
    });

    let traffic_consumer = broker.consumer(TRAFFIC_QUEUE);
    let traffic_handler = Arc::new(TrafficHandler::new(index.clone(), publisher));
    let traffic_token = token.clone();
    let traffic_task =
        tokio::spawn(async move { traffic_consumer.run(traffic_token, traffic_handler).await });

    let route_consumer = broker.consumer(ROUTE_EVENTS_QUEUE);
    let route_handler = Arc::new(RouteEventsHandler::new(index));
    let route_token = token.clone();
    let route_task =
        tokio::spawn(async move { route_consumer.run(route_token, route_handler).await });

    shutdown_signal().await;
    info!("shutdown signal received, stopping consumers");
    token.cancel();

    let _ = tokio::join!(traffic_task, route_task, sweeper);
    broker.close().await;
    info!("notification service shut down cleanly");
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
