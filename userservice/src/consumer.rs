//! Consumes per-user directives off the notifications exchange and injects
//! the recalculation prompt into the user's session via the gateway.

use std::time::Duration;

use async_trait::async_trait;
use optimaldn_common::broker::{Disposition, MessageHandler};
use optimaldn_common::routing::KEY_DIRECTIVE_SUDDEN;
use optimaldn_common::schema::{PerUserDirective, RECALC_PROMPT_MARKER};
use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("gateway returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Posts `(userID, msg)` form fields to the gateway's notification endpoint.
pub struct GatewayNotifier {
    http: Client,
    base_url: String,
}

impl GatewayNotifier {
    pub fn new(base_url: &str) -> Result<Self, NotifyError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn notify(&self, user_id: &str, msg: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(format!("{}/send-notification", self.base_url))
            .form(&[("userID", user_id), ("msg", msg)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }
        Ok(())
    }
}

pub struct DirectiveHandler {
    notifier: GatewayNotifier,
}

impl DirectiveHandler {
    pub fn new(notifier: GatewayNotifier) -> Self {
        Self { notifier }
    }
}

/// The prompt text carries the marker substrings the session client watches
/// for, so changing them breaks the client dialogue.
pub(crate) fn prompt_for(routing_key: &str, directive: &PerUserDirective) -> String {
    if routing_key == KEY_DIRECTIVE_SUDDEN {
        format!("⚠️ Sudden service worsening on your route. {RECALC_PROMPT_MARKER}")
    } else {
        format!("⚠️ {} {RECALC_PROMPT_MARKER}", directive.reason)
    }
}

#[async_trait]
impl MessageHandler for DirectiveHandler {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Disposition {
        let directive: PerUserDirective = match serde_json::from_slice(body) {
            Ok(directive) => directive,
            Err(e) => {
                warn!(routing_key, error = %e, "malformed directive, dropping");
                return Disposition::Drop;
            }
        };
        let prompt = prompt_for(routing_key, &directive);
        // Push failures are not retried: the user is simply not connected.
        match self.notifier.notify(&directive.user_id, &prompt).await {
            Ok(()) => info!(user_id = %directive.user_id, "prompt delivered to session"),
            Err(e) => {
                warn!(user_id = %directive.user_id, error = %e, "failed to deliver prompt")
            }
        }
        Disposition::Ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimaldn_common::routing::KEY_DIRECTIVE_CRITICAL;

    fn directive(reason: &str) -> PerUserDirective {
        PerUserDirective {
            user_id: "alice".into(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn critical_prompts_carry_the_reason_and_the_marker() {
        let prompt = prompt_for(
            KEY_DIRECTIVE_CRITICAL,
            &directive("Line jubilee for user alice is experiencing critical delays."),
        );
        assert!(prompt.contains("jubilee"));
        assert!(prompt.contains("critical delays"));
        assert!(prompt.contains("Recalculate? (y/n)"));
    }

    #[test]
    fn sudden_prompts_carry_the_worsening_marker() {
        let prompt = prompt_for(KEY_DIRECTIVE_SUDDEN, &directive("ignored"));
        assert!(prompt.contains("Sudden service worsening"));
        assert!(prompt.contains("Recalculate? (y/n)"));
    }
}
