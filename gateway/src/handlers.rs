//! REST facade over the planner and user-service RPCs, plus the
//! notification injection endpoint used by the user service.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use optimaldn_common::schema::{
    Credentials, ErrorResponse, PerUserDirective, RouteResult, StatusReply, UserRequest,
    UserSavedRoute,
};
use serde::Deserialize;
use tracing::warn;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::clients::{PlannerClient, UserServiceClient};
use crate::error::ApiError;
use crate::sessions::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<PlannerClient>,
    pub users: Arc<UserServiceClient>,
    pub sessions: SessionRegistry,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserIdQuery {
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SavedRouteQuery {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "routeID")]
    pub route_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendNotificationForm {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub msg: String,
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Authentication result", body = StatusReply),
        (status = 502, description = "User service unavailable", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<StatusReply>, ApiError> {
    Ok(Json(state.users.authenticate(&credentials).await?))
}

#[utoipa::path(
    get,
    path = "/user/saved-routes",
    params(UserIdQuery),
    responses(
        (status = 200, description = "The user's saved routes", body = [UserSavedRoute]),
        (status = 400, description = "Missing userID", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn saved_routes(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<Vec<UserSavedRoute>>, ApiError> {
    require_user_id(&query.user_id)?;
    Ok(Json(state.users.saved_routes(&query.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/user/saved-route",
    params(SavedRouteQuery),
    responses(
        (status = 200, description = "The saved route", body = UserSavedRoute),
        (status = 404, description = "No such saved route", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn saved_route(
    State(state): State<AppState>,
    Query(query): Query<SavedRouteQuery>,
) -> Result<Json<UserSavedRoute>, ApiError> {
    require_user_id(&query.user_id)?;
    Ok(Json(
        state
            .users
            .saved_route(&query.user_id, query.route_id)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/user/accept-saved-route",
    request_body = UserSavedRoute,
    responses(
        (status = 200, description = "Saved route activated", body = StatusReply)
    ),
    tag = "user"
)]
pub async fn accept_saved_route(
    State(state): State<AppState>,
    Json(saved): Json<UserSavedRoute>,
) -> Result<Json<StatusReply>, ApiError> {
    require_user_id(&saved.user_id)?;
    Ok(Json(state.users.accept_saved(&saved).await?))
}

#[utoipa::path(
    post,
    path = "/user/save-favorite",
    request_body = PerUserDirective,
    responses(
        (status = 200, description = "Active route saved as favorite", body = StatusReply),
        (status = 404, description = "No active route to save", body = ErrorResponse)
    ),
    tag = "user"
)]
pub async fn save_favorite(
    State(state): State<AppState>,
    Json(request): Json<PerUserDirective>,
) -> Result<Json<StatusReply>, ApiError> {
    require_user_id(&request.user_id)?;
    Ok(Json(state.users.save_favorite(&request).await?))
}

#[utoipa::path(
    post,
    path = "/route/request",
    request_body = UserRequest,
    responses(
        (status = 200, description = "Best-scoring route", body = RouteResult),
        (status = 400, description = "Unknown location", body = ErrorResponse),
        (status = 502, description = "Transit API unavailable", body = ErrorResponse)
    ),
    tag = "route"
)]
pub async fn route_request(
    State(state): State<AppState>,
    Json(request): Json<UserRequest>,
) -> Result<Json<RouteResult>, ApiError> {
    require_user_id(&request.user_id)?;
    Ok(Json(state.planner.serve_request(&request).await?))
}

#[utoipa::path(
    post,
    path = "/route/recalculate-route",
    request_body = PerUserDirective,
    responses(
        (status = 200, description = "Recalculated route", body = RouteResult),
        (status = 404, description = "No active route", body = ErrorResponse)
    ),
    tag = "route"
)]
pub async fn recalculate_route(
    State(state): State<AppState>,
    Json(request): Json<PerUserDirective>,
) -> Result<Json<RouteResult>, ApiError> {
    require_user_id(&request.user_id)?;
    Ok(Json(state.planner.recalculate(&request).await?))
}

#[utoipa::path(
    post,
    path = "/route/terminate",
    request_body = PerUserDirective,
    responses(
        (status = 200, description = "Route terminated", body = StatusReply),
        (status = 404, description = "No active route", body = ErrorResponse)
    ),
    tag = "route"
)]
pub async fn terminate_route(
    State(state): State<AppState>,
    Json(request): Json<PerUserDirective>,
) -> Result<Json<StatusReply>, ApiError> {
    require_user_id(&request.user_id)?;
    Ok(Json(state.planner.terminate(&request).await?))
}

#[utoipa::path(
    post,
    path = "/send-notification",
    request_body(content = SendNotificationForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Message pushed to the user's session"),
        (status = 500, description = "User not connected or push failed")
    ),
    tag = "sessions"
)]
pub async fn send_notification(
    State(state): State<AppState>,
    Form(form): Form<SendNotificationForm>,
) -> Response {
    match state.sessions.push(&form.user_id, &form.msg) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!(user_id = %form.user_id, error = %e, "notification push failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to send").into_response()
        }
    }
}

fn require_user_id(user_id: &str) -> Result<(), ApiError> {
    if user_id.is_empty() {
        return Err(ApiError::Validation("missing userID".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_ids_are_rejected() {
        assert!(require_user_id("").is_err());
        assert!(require_user_id("alice").is_ok());
    }
}
