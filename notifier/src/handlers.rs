//! Bus handlers: fan alert batches out to subscribed users, and keep the
//! subscription index in step with route lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use optimaldn_common::broker::{BrokerError, Disposition, EventPublisher, MessageHandler};
use optimaldn_common::routing::{
    HEADER_ALERT_TYPE, KEY_DIRECTIVE_CRITICAL, KEY_DIRECTIVE_SUDDEN, KEY_ROUTE_CREATED,
    KEY_ROUTE_TERMINATED,
};
use optimaldn_common::schema::{
    ActiveSubscription, Alert, AlertType, NotificationPayload, PerUserDirective,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::subscriptions::{SubscriptionError, SubscriptionIndex, SubscriptionStore};

#[derive(Debug, Error)]
pub enum FanOutError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error("directive serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("directive publish failed: {0}")]
    Publish(#[from] BrokerError),
}

/// Consumes alert batches from the traffic exchange and publishes one
/// directive per affected user.
pub struct TrafficHandler<S> {
    index: Arc<SubscriptionIndex<S>>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S: SubscriptionStore> TrafficHandler<S> {
    pub fn new(index: Arc<SubscriptionIndex<S>>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { index, publisher }
    }

    async fn fan_out(&self, alert_type: AlertType, alert: &Alert) -> Result<(), FanOutError> {
        let users = self.index.lookup_users(&alert.line_name).await?;
        if users.is_empty() {
            info!(line = %alert.line_name, "no active subscriptions for line");
            return Ok(());
        }
        let routing_key = directive_key(alert_type);
        for user_id in users {
            let directive = PerUserDirective {
                reason: directive_reason(alert_type, &alert.line_name, &user_id),
                user_id,
            };
            let body = serde_json::to_vec(&directive)?;
            self.publisher
                .publish_event(
                    routing_key,
                    body,
                    (HEADER_ALERT_TYPE, alert_type.as_str().to_string()),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: SubscriptionStore> MessageHandler for TrafficHandler<S> {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Disposition {
        let payload: NotificationPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(routing_key, error = %e, "malformed alert payload, dropping");
                return Disposition::Drop;
            }
        };
        info!(
            alert_type = payload.alert_type.as_str(),
            alerts = payload.alerts.len(),
            "received alert batch"
        );
        for alert in &payload.alerts {
            if let Err(e) = self.fan_out(payload.alert_type, alert).await {
                warn!(line = %alert.line_name, error = %e, "directive fan-out failed");
                return Disposition::Requeue;
            }
        }
        Disposition::Ack
    }
}

pub(crate) fn directive_key(alert_type: AlertType) -> &'static str {
    match alert_type {
        AlertType::CriticalDelay => KEY_DIRECTIVE_CRITICAL,
        AlertType::SuddenServiceWorsening => KEY_DIRECTIVE_SUDDEN,
    }
}

pub(crate) fn directive_reason(alert_type: AlertType, line: &str, user: &str) -> String {
    match alert_type {
        AlertType::CriticalDelay => {
            format!("Line {line} for user {user} is experiencing critical delays.")
        }
        AlertType::SuddenServiceWorsening => {
            format!("Line {line} for user {user} is experiencing sudden worsening delays.")
        }
    }
}

/// Keeps the subscription index consistent with the planner's lifecycle
/// events.
pub struct RouteEventsHandler<S> {
    index: Arc<SubscriptionIndex<S>>,
}

impl<S: SubscriptionStore> RouteEventsHandler<S> {
    pub fn new(index: Arc<SubscriptionIndex<S>>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl<S: SubscriptionStore> MessageHandler for RouteEventsHandler<S> {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Disposition {
        let subscription: ActiveSubscription = match serde_json::from_slice(body) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(routing_key, error = %e, "malformed route event, dropping");
                return Disposition::Drop;
            }
        };
        match routing_key {
            KEY_ROUTE_CREATED => match self.index.upsert(&subscription).await {
                Ok(()) => {
                    info!(
                        user_id = %subscription.user_id,
                        lines = subscription.line_ids.len(),
                        "stored active subscription"
                    );
                    Disposition::Ack
                }
                Err(e) => {
                    warn!(user_id = %subscription.user_id, error = %e, "failed to store subscription");
                    Disposition::Requeue
                }
            },
            KEY_ROUTE_TERMINATED => match self.index.delete(&subscription.user_id).await {
                Ok(Some(removed)) => {
                    info!(
                        user_id = %removed.user_id,
                        lines = removed.line_ids.len(),
                        "removed active subscription"
                    );
                    Disposition::Ack
                }
                Ok(None) => {
                    info!(user_id = %subscription.user_id, "no active subscription to remove");
                    Disposition::Ack
                }
                Err(e) => {
                    warn!(user_id = %subscription.user_id, error = %e, "failed to remove subscription");
                    Disposition::Requeue
                }
            },
            _ => {
                warn!(routing_key, "unrecognized routing key, dropping");
                Disposition::Drop
            }
        }
    }
}
