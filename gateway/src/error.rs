//! Gateway error mapping: validation → 400, not-found → 404, transient
//! upstream trouble → 502, everything else → 500. Statuses already chosen
//! by a backend service are forwarded unchanged.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use optimaldn_common::schema::ErrorResponse;
use tracing::{error, warn};

use crate::clients::ClientError;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Upstream(String),
    Forward { status: StatusCode, message: String },
    Internal(String),
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Network(inner) => ApiError::Upstream(inner.to_string()),
            ClientError::Upstream { status, message } => {
                if status.is_server_error() {
                    ApiError::Upstream(message)
                } else {
                    ApiError::Forward { status, message }
                }
            }
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Forward { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(message)
            | ApiError::NotFound(message)
            | ApiError::Upstream(message)
            | ApiError::Internal(message)
            | ApiError::Forward { message, .. } => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = %status, error = %self.message(), "request failed");
        } else {
            warn!(status = %status, error = %self.message(), "request rejected");
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
