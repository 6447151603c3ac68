//! The user service's RPC surface: authentication and saved-route
//! management, consumed by the gateway.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use optimaldn_common::schema::{
    Credentials, ErrorResponse, PerUserDirective, Status, StatusReply, UserSavedRoute,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth;
use crate::convert::to_saved_route;
use crate::planner_client::{ClientError, PlannerClient};
use crate::store::{StoreError, UserStore};

pub struct UserService {
    pub store: UserStore,
    pub planner: PlannerClient,
}

pub fn router(service: Arc<UserService>) -> Router {
    Router::new()
        .route("/rpc/authenticate", post(authenticate))
        .route("/rpc/saved-routes/{user_id}", get(saved_routes))
        .route("/rpc/saved-route/{user_id}/{route_id}", get(saved_route))
        .route("/rpc/save-favorite", post(save_favorite))
        .route("/rpc/accept-saved-route", post(accept_saved_route))
        .with_state(service)
}

/// Authentication failures reply with `Status::Error` rather than an HTTP
/// error; the gateway forwards the reply as-is.
async fn authenticate(
    State(service): State<Arc<UserService>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<StatusReply>, UserError> {
    let denied = StatusReply {
        user_id: String::new(),
        status: Status::Error,
    };

    let Some(hash) = service.store.password_hash(&credentials.user_id).await? else {
        info!(user_id = %credentials.user_id, "unknown user");
        return Ok(Json(denied));
    };
    match auth::verify_password(&credentials.password, &hash) {
        Ok(true) => Ok(Json(StatusReply {
            user_id: credentials.user_id,
            status: Status::Done,
        })),
        Ok(false) => {
            info!(user_id = %credentials.user_id, "invalid password");
            Ok(Json(denied))
        }
        Err(e) => {
            error!(user_id = %credentials.user_id, error = %e, "stored hash is unusable");
            Ok(Json(denied))
        }
    }
}

async fn saved_routes(
    State(service): State<Arc<UserService>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<UserSavedRoute>>, UserError> {
    Ok(Json(service.store.saved_routes(&user_id).await?))
}

async fn saved_route(
    State(service): State<Arc<UserService>>,
    Path((user_id, route_id)): Path<(String, Uuid)>,
) -> Result<Json<UserSavedRoute>, UserError> {
    service
        .store
        .saved_route(&user_id, route_id)
        .await?
        .map(Json)
        .ok_or_else(|| UserError::NotFound(format!("no saved route {route_id} for {user_id}")))
}

/// Save the currently active route as a favorite: fetch it from the
/// planner, convert, insert.
async fn save_favorite(
    State(service): State<Arc<UserService>>,
    Json(request): Json<PerUserDirective>,
) -> Result<Json<StatusReply>, UserError> {
    let route = service.planner.current_route(&request.user_id).await?;
    let saved = to_saved_route(&request.user_id, &route)
        .ok_or_else(|| UserError::Validation("active route has no legs to save".into()))?;
    service.store.insert_saved_route(&saved).await?;
    Ok(Json(StatusReply {
        user_id: request.user_id,
        status: Status::Done,
    }))
}

async fn accept_saved_route(
    State(service): State<Arc<UserService>>,
    Json(saved): Json<UserSavedRoute>,
) -> Result<Json<StatusReply>, UserError> {
    Ok(Json(service.planner.accept_saved(&saved).await?))
}

#[derive(Debug)]
pub enum UserError {
    Validation(String),
    NotFound(String),
    Store(StoreError),
    Planner(ClientError),
}

impl From<StoreError> for UserError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ClientError> for UserError {
    fn from(e: ClientError) -> Self {
        if e.is_not_found() {
            Self::NotFound(e.to_string())
        } else {
            Self::Planner(e)
        }
    }
}

impl UserError {
    fn status(&self) -> StatusCode {
        match self {
            UserError::Validation(_) => StatusCode::BAD_REQUEST,
            UserError::NotFound(_) => StatusCode::NOT_FOUND,
            UserError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UserError::Planner(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn message(&self) -> String {
        match self {
            UserError::Validation(message) | UserError::NotFound(message) => message.clone(),
            UserError::Store(e) => e.to_string(),
            UserError::Planner(e) => e.to_string(),
        }
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.message(), "user service operation failed");
        } else {
            warn!(error = %self.message(), "user service request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_follow_the_policy() {
        assert_eq!(
            UserError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UserError::NotFound("missing".into()).status(),
            StatusCode::NOT_FOUND
        );
        let upstream = UserError::Planner(ClientError::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "boom".into(),
        });
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn upstream_not_found_is_forwarded_as_not_found() {
        let err: UserError = ClientError::Upstream {
            status: StatusCode::NOT_FOUND,
            message: "no active route".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
