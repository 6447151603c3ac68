//! The planner's RPC surface: internal JSON endpoints consumed by the
//! gateway and the user service.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use optimaldn_common::schema::{
    ErrorResponse, PerUserDirective, RouteResult, StatusReply, UserRequest, UserRoute,
    UserSavedRoute,
};
use tracing::{error, warn};

use crate::planner::{Planner, PlannerError};

pub fn router(planner: Arc<Planner>) -> Router {
    Router::new()
        .route("/rpc/serve-request", post(serve_request))
        .route("/rpc/recalculate-route", post(recalculate_route))
        .route("/rpc/terminate-route", post(terminate_route))
        .route("/rpc/accept-saved-route", post(accept_saved_route))
        .route("/rpc/current-route/{user_id}", get(current_route))
        .with_state(planner)
}

async fn serve_request(
    State(planner): State<Arc<Planner>>,
    Json(request): Json<UserRequest>,
) -> Result<Json<RouteResult>, RpcError> {
    Ok(Json(planner.serve_request(&request).await?))
}

async fn recalculate_route(
    State(planner): State<Arc<Planner>>,
    Json(request): Json<PerUserDirective>,
) -> Result<Json<RouteResult>, RpcError> {
    Ok(Json(planner.recalculate(&request).await?))
}

async fn terminate_route(
    State(planner): State<Arc<Planner>>,
    Json(request): Json<PerUserDirective>,
) -> Result<Json<StatusReply>, RpcError> {
    Ok(Json(planner.terminate(&request).await?))
}

async fn accept_saved_route(
    State(planner): State<Arc<Planner>>,
    Json(saved): Json<UserSavedRoute>,
) -> Result<Json<StatusReply>, RpcError> {
    Ok(Json(planner.accept_saved(&saved).await?))
}

async fn current_route(
    State(planner): State<Arc<Planner>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserRoute>, RpcError> {
    Ok(Json(planner.get_current(&user_id).await?))
}

struct RpcError(PlannerError);

impl From<PlannerError> for RpcError {
    fn from(e: PlannerError) -> Self {
        Self(e)
    }
}

impl RpcError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PlannerError::UnknownLocation(_)
            | PlannerError::JourneyCompleted
            | PlannerError::CannotEstimate => StatusCode::BAD_REQUEST,
            PlannerError::NoActiveRoute(_) | PlannerError::NoJourneys(_, _) => {
                StatusCode::NOT_FOUND
            }
            PlannerError::Tfl(_) => StatusCode::BAD_GATEWAY,
            PlannerError::State(_) | PlannerError::Publish(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "planner operation failed");
        } else {
            warn!(error = %self.0, "planner request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
