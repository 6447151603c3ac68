mod auth;
mod config;
mod consumer;
mod convert;
mod planner_client;
mod rpc;
mod store;

use std::sync::Arc;

use optimaldn_common::broker::Broker;
use optimaldn_common::routing::{
    BIND_DIRECTIVES_CRITICAL, BIND_DIRECTIVES_SUDDEN, NOTIFICATIONS_EXCHANGE,
    USER_DIRECTIVES_QUEUE,
};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use consumer::{DirectiveHandler, GatewayNotifier};
use planner_client::PlannerClient;
use rpc::UserService;
use store::UserStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    info!("starting user service");
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database ready");

    let planner = PlannerClient::new(&config.route_planner_addr)?;
    info!(addr = %config.route_planner_addr, "route planner client ready");

    let broker = Broker::connect(&config.broker_url).await?;
    broker.declare_exchange(NOTIFICATIONS_EXCHANGE).await?;
    broker
        .declare_and_bind(
            USER_DIRECTIVES_QUEUE,
            BIND_DIRECTIVES_CRITICAL,
            NOTIFICATIONS_EXCHANGE,
        )
        .await?;
    broker
        .declare_and_bind(
            USER_DIRECTIVES_QUEUE,
            BIND_DIRECTIVES_SUDDEN,
            NOTIFICATIONS_EXCHANGE,
        )
        .await?;

    let token = CancellationToken::new();

    let directive_consumer = broker.consumer(USER_DIRECTIVES_QUEUE);
    let handler = Arc::new(DirectiveHandler::new(GatewayNotifier::new(
        &config.api_gateway_url,
    )?));
    let consumer_token = token.clone();
    let consumer_task =
        tokio::spawn(async move { directive_consumer.run(consumer_token, handler).await });

    let service = Arc::new(UserService {
        store: UserStore::new(pool),
        planner,
    });
    let app = rpc::router(service);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!(port = %config.port, "user service RPC listening");

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

    let _ = consumer_task.await;
    broker.close().await;
    info!("user service shut down cleanly");
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
