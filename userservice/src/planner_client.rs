//! HTTP client for the route planner's RPC surface.

use std::time::Duration;

use optimaldn_common::schema::{ErrorResponse, StatusReply, UserRoute, UserSavedRoute};
use reqwest::{Client, StatusCode};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: StatusCode, message: String },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::Upstream {
                status: StatusCode::NOT_FOUND,
                ..
            }
        )
    }
}

/// Addresses come from the environment as `host:port`; a scheme is added
/// when missing.
pub fn normalize_addr(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", addr.trim_end_matches('/'))
    }
}

pub struct PlannerClient {
    http: Client,
    base_url: String,
}

impl PlannerClient {
    pub fn new(addr: &str) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: normalize_addr(addr),
        })
    }

    pub async fn current_route(&self, user_id: &str) -> Result<UserRoute, ClientError> {
        let response = self
            .http
            .get(format!("{}/rpc/current-route/{user_id}", self.base_url))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn accept_saved(&self, saved: &UserSavedRoute) -> Result<StatusReply, ClientError> {
        let response = self
            .http
            .post(format!("{}/rpc/accept-saved-route", self.base_url))
            .json(saved)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());
    Err(ClientError::Upstream { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_a_scheme() {
        assert_eq!(normalize_addr("routeplanner:5002"), "http://routeplanner:5002");
        assert_eq!(
            normalize_addr("http://routeplanner:5002/"),
            "http://routeplanner:5002"
        );
    }
}
