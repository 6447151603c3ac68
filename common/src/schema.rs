//! Data shapes shared across service boundaries: RPC request/reply records,
//! route state, and the payloads carried on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Wall-clock format used by journey legs, interpreted in the fixed
/// Europe/London zone.
pub const LEG_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Substring the session client watches for to offer a recalculation.
/// Part of the wire contract with the interactive client.
pub const RECALC_PROMPT_MARKER: &str = "Recalculate? (y/n)";

/// A new journey request as submitted through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub start_point: String,
    pub end_point: String,
    pub departure: DateTime<Utc>,
}

/// Per-user message published by the notification router, and the request
/// record for recalculation/termination RPCs.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerUserDirective {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Status {
    Pending,
    Done,
    Error,
}

/// Generic acknowledgement reply used by user-service and planner RPCs.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub status: Status,
}

/// Login credentials checked against the user table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub password: String,
}

/// A favorite route the user can later re-activate.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSavedRoute {
    #[serde(rename = "routeID")]
    pub route_id: Uuid,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub start_point: String,
    pub end_point: String,
    pub transport_mode: String,
    pub stops: i32,
    pub estimated_time: i32,
    pub line_names: Vec<String>,
    pub stops_names: Vec<String>,
}

/// The user's currently chosen journey.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRoute {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub total_duration: i32,
    pub description: String,
    pub legs: Vec<RouteLeg>,
}

/// One continuous segment of a journey on a single line/mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    pub from_name: String,
    #[serde(rename = "fromID")]
    pub from_id: String,
    pub to_name: String,
    #[serde(rename = "toID")]
    pub to_id: String,
    pub mode: String,
    pub start_time: String,
    pub end_time: String,
    pub description: String,
    pub line_name: String,
    #[serde(rename = "lineID")]
    pub line_id: String,
    pub stops: Vec<String>,
    #[serde(rename = "stopIDs")]
    pub stop_ids: Vec<String>,
}

/// Projection of a [`UserRoute`] onto the set of lines it touches; the join
/// key for alert fan-out. Exactly one per user with an active route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSubscription {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "lineIDs")]
    pub line_ids: Vec<String>,
}

impl UserRoute {
    /// Distinct line names across the legs, first-seen order. Legs without a
    /// line (walking segments) carry no subscription.
    pub fn subscription(&self) -> ActiveSubscription {
        let mut line_ids: Vec<String> = Vec::new();
        for leg in &self.legs {
            if leg.line_name.is_empty() {
                continue;
            }
            if !line_ids.contains(&leg.line_name) {
                line_ids.push(leg.line_name.clone());
            }
        }
        ActiveSubscription {
            user_id: self.user_id.clone(),
            line_ids,
        }
    }
}

/// Reply record for a successful plan or recalculation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub from: String,
    pub to: String,
    pub score: f64,
    pub summary: String,
}

/// Classification of an alert batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AlertType {
    CriticalDelay,
    SuddenServiceWorsening,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::CriticalDelay => "CriticalDelay",
            AlertType::SuddenServiceWorsening => "SuddenServiceWorsening",
        }
    }
}

/// One anomaly record for a line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub line_name: String,
    pub mode_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: AlertDetail,
}

/// The variant-specific part of an alert. Flattened into the envelope so the
/// wire shape keeps the flat field names consumers already expect.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AlertDetail {
    #[serde(rename_all = "camelCase")]
    CriticalDelay {
        status_description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SuddenServiceWorsening { severity_drop: f64 },
}

/// A batch of alerts of one type, published by the anomaly detector.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub alert_type: AlertType,
    pub alerts: Vec<Alert>,
    pub generated_at: DateTime<Utc>,
}

/// JSON error body returned by every HTTP surface in the system.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn leg(line: &str) -> RouteLeg {
        RouteLeg {
            line_name: line.to_string(),
            ..RouteLeg::default()
        }
    }

    #[test]
    fn subscription_deduplicates_lines_in_first_seen_order() {
        let route = UserRoute {
            user_id: "alice".into(),
            total_duration: 30,
            description: "Journey with 3 legs".into(),
            legs: vec![leg("jubilee"), leg("central"), leg("jubilee")],
        };
        let sub = route.subscription();
        assert_eq!(sub.user_id, "alice");
        assert_eq!(sub.line_ids, vec!["jubilee", "central"]);
    }

    #[test]
    fn subscription_skips_legs_without_a_line() {
        let route = UserRoute {
            user_id: "bob".into(),
            total_duration: 10,
            description: String::new(),
            legs: vec![leg(""), leg("district")],
        };
        assert_eq!(route.subscription().line_ids, vec!["district"]);
    }

    #[test]
    fn subscription_wire_shape_uses_capitalized_ids() {
        let sub = ActiveSubscription {
            user_id: "alice".into(),
            line_ids: vec!["jubilee".into()],
        };
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["userID"], "alice");
        assert_eq!(json["lineIDs"][0], "jubilee");
    }

    #[test]
    fn directive_wire_shape() {
        let directive = PerUserDirective {
            user_id: "alice".into(),
            reason: "Line jubilee is delayed".into(),
        };
        let json = serde_json::to_value(&directive).unwrap();
        assert_eq!(json["userID"], "alice");
        assert_eq!(json["reason"], "Line jubilee is delayed");
    }

    #[test]
    fn critical_alert_round_trips_with_flat_fields() {
        let alert = Alert {
            line_name: "jubilee".into(),
            mode_name: "tube".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap(),
            detail: AlertDetail::CriticalDelay {
                status_description: "Severe Delays".into(),
                reason: Some("signal failure".into()),
            },
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["lineName"], "jubilee");
        assert_eq!(json["statusDescription"], "Severe Delays");
        assert_eq!(json["reason"], "signal failure");
        assert!(json.get("severityDrop").is_none());

        let back: Alert = serde_json::from_value(json).unwrap();
        assert!(matches!(back.detail, AlertDetail::CriticalDelay { .. }));
    }

    #[test]
    fn sudden_alert_round_trips_with_severity_drop() {
        let alert = Alert {
            line_name: "district".into(),
            mode_name: "tube".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap(),
            detail: AlertDetail::SuddenServiceWorsening {
                severity_drop: -4.0,
            },
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["severityDrop"], -4.0);
        assert!(json.get("statusDescription").is_none());

        let back: Alert = serde_json::from_value(json).unwrap();
        match back.detail {
            AlertDetail::SuddenServiceWorsening { severity_drop } => {
                assert_eq!(severity_drop, -4.0)
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn payload_carries_alert_type_tag() {
        let payload = NotificationPayload {
            alert_type: AlertType::CriticalDelay,
            alerts: vec![],
            generated_at: Utc::now(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["alertType"], "CriticalDelay");
        assert!(json["generatedAt"].is_string());
    }
}
