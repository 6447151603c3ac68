//! Bus topology: exchange names, routing keys and binding patterns.
//!
//! Every exchange is durable and topic-typed. The constants here are the
//! contract between publishers and consumers; services never hardcode keys.

/// Published to by the anomaly detector.
pub const TRAFFIC_EXCHANGE: &str = "traffic_events_exchange";
/// Published to by the route planner (subscription lifecycle events).
pub const ROUTE_EXCHANGE: &str = "route_planner_exchange";
/// Published to by the notification router (per-user directives).
pub const NOTIFICATIONS_EXCHANGE: &str = "notification_outbound_events_exchange";

pub const KEY_TRAFFIC_CRITICAL: &str = "traffic.route.update.critical";
pub const KEY_TRAFFIC_SUDDEN: &str = "traffic.route.update.sudden";

pub const KEY_ROUTE_CREATED: &str = "active.route.created";
pub const KEY_ROUTE_TERMINATED: &str = "active.route.terminated";

pub const KEY_DIRECTIVE_CRITICAL: &str = "route.update.critical";
pub const KEY_DIRECTIVE_SUDDEN: &str = "user.update.sudden";

pub const TRAFFIC_QUEUE: &str = "traffic_queue";
pub const ROUTE_EVENTS_QUEUE: &str = "route_planner_queue";
pub const USER_DIRECTIVES_QUEUE: &str = "notifications_user_queue";

pub const BIND_TRAFFIC_ALERTS: &str = "traffic.route.update.#";
pub const BIND_ROUTE_EVENTS: &str = "active.route.#";
pub const BIND_DIRECTIVES_CRITICAL: &str = "route.update.#";
pub const BIND_DIRECTIVES_SUDDEN: &str = "user.update.#";

pub const HEADER_ALERT_TYPE: &str = "Alert-Type";
pub const HEADER_EVENT_TYPE: &str = "Event-Type";

pub const EVENT_ROUTE_CREATED: &str = "Route Created";
pub const EVENT_ROUTE_TERMINATED: &str = "Route Terminated";
