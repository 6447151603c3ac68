mod clients;
mod config;
mod error;
mod handlers;
mod sessions;
mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use clients::{PlannerClient, UserServiceClient};
use config::Config;
use handlers::AppState;
use sessions::SessionRegistry;

#[derive(OpenApi)]
#[openapi(
    info(title = "OptimaLDN API Gateway", version = "0.1.0"),
    paths(
        handlers::login,
        handlers::saved_routes,
        handlers::saved_route,
        handlers::accept_saved_route,
        handlers::save_favorite,
        handlers::route_request,
        handlers::recalculate_route,
        handlers::terminate_route,
        handlers::send_notification,
    ),
    components(schemas(
        optimaldn_common::schema::Credentials,
        optimaldn_common::schema::StatusReply,
        optimaldn_common::schema::Status,
        optimaldn_common::schema::UserRequest,
        optimaldn_common::schema::PerUserDirective,
        optimaldn_common::schema::RouteResult,
        optimaldn_common::schema::UserSavedRoute,
        optimaldn_common::schema::ErrorResponse,
        handlers::SendNotificationForm,
    )),
    tags(
        (name = "user", description = "Login and saved-route management"),
        (name = "route", description = "Journey planning and lifecycle"),
        (name = "sessions", description = "Session push channel")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    info!("starting API gateway");
    let config = Config::from_env()?;

    let state = AppState {
        planner: Arc::new(PlannerClient::new(&config.route_planner_addr)?),
        users: Arc::new(UserServiceClient::new(&config.user_service_addr)?),
        sessions: SessionRegistry::new(),
    };
    info!(
        planner = %config.route_planner_addr,
        users = %config.user_service_addr,
        "backend clients ready"
    );

    let app = Router::new()
        .route("/login", post(handlers::login))
        .route("/user/saved-routes", get(handlers::saved_routes))
        .route("/user/saved-route", get(handlers::saved_route))
        .route("/user/accept-saved-route", post(handlers::accept_saved_route))
        .route("/user/save-favorite", post(handlers::save_favorite))
        .route("/route/request", post(handlers::route_request))
        .route("/route/recalculate-route", post(handlers::recalculate_route))
        .route("/route/terminate", post(handlers::terminate_route))
        .route("/ws", get(ws::ws_session))
        .route("/send-notification", post(handlers::send_notification))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!(port = %config.port, "API gateway listening");

    let shutdown_token = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    info!("API gateway shut down cleanly");
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
