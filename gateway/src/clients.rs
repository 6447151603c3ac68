//! HTTP clients for the backend RPC surfaces.

use std::time::Duration;

use optimaldn_common::schema::{
    Credentials, ErrorResponse, PerUserDirective, RouteResult, StatusReply, UserRequest,
    UserSavedRoute,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: StatusCode, message: String },
}

/// Addresses come from the environment as `host:port`; a scheme is added
/// when missing.
fn normalize_addr(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", addr.trim_end_matches('/'))
    }
}

struct RpcClient {
    http: Client,
    base_url: String,
}

impl RpcClient {
    fn new(addr: &str) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: normalize_addr(addr),
        })
    }

    async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, ClientError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn get_json<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, ClientError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
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

pub struct PlannerClient {
    rpc: RpcClient,
}

impl PlannerClient {
    pub fn new(addr: &str) -> Result<Self, ClientError> {
        Ok(Self {
            rpc: RpcClient::new(addr)?,
        })
    }

    pub async fn serve_request(&self, request: &UserRequest) -> Result<RouteResult, ClientError> {
        self.rpc.post_json("/rpc/serve-request", request).await
    }

    pub async fn recalculate(
        &self,
        request: &PerUserDirective,
    ) -> Result<RouteResult, ClientError> {
        self.rpc.post_json("/rpc/recalculate-route", request).await
    }

    pub async fn terminate(&self, request: &PerUserDirective) -> Result<StatusReply, ClientError> {
        self.rpc.post_json("/rpc/terminate-route", request).await
    }
}

pub struct UserServiceClient {
    rpc: RpcClient,
}

impl UserServiceClient {
    pub fn new(addr: &str) -> Result<Self, ClientError> {
        Ok(Self {
            rpc: RpcClient::new(addr)?,
        })
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<StatusReply, ClientError> {
        self.rpc.post_json("/rpc/authenticate", credentials).await
    }

    pub async fn saved_routes(&self, user_id: &str) -> Result<Vec<UserSavedRoute>, ClientError> {
        self.rpc.get_json(&format!("/rpc/saved-routes/{user_id}")).await
    }

    pub async fn saved_route(
        &self,
        user_id: &str,
        route_id: Uuid,
    ) -> Result<UserSavedRoute, ClientError> {
        self.rpc
            .get_json(&format!("/rpc/saved-route/{user_id}/{route_id}"))
            .await
    }

    pub async fn save_favorite(&self, request: &PerUserDirective) -> Result<StatusReply, ClientError> {
        self.rpc.post_json("/rpc/save-favorite", request).await
    }

    pub async fn accept_saved(&self, saved: &UserSavedRoute) -> Result<StatusReply, ClientError> {
        self.rpc.post_json("/rpc/accept-saved-route", saved).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_a_scheme() {
        assert_eq!(normalize_addr("userservice:5001"), "http://userservice:5001");
        assert_eq!(
            normalize_addr("https://planner.internal/"),
            "https://planner.internal"
        );
    }
}
