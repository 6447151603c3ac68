//! The anomaly detection loop: poll the time series once a minute, classify
//! rows into alerts, and publish one batch per non-empty alert type.

use std::time::Duration;

use chrono::{DateTime, Utc};
use optimaldn_common::broker::Publisher;
use optimaldn_common::routing::{HEADER_ALERT_TYPE, KEY_TRAFFIC_CRITICAL, KEY_TRAFFIC_SUDDEN};
use optimaldn_common::schema::{Alert, AlertDetail, AlertType, NotificationPayload};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::influx::{FluxRecord, InfluxClient};
use crate::queries;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

pub struct DelayMonitor {
    influx: InfluxClient,
    publisher: Publisher,
    bucket: String,
}

impl DelayMonitor {
    pub fn new(influx: InfluxClient, publisher: Publisher, bucket: String) -> Self {
        Self {
            influx,
            publisher,
            bucket,
        }
    }

    pub async fn run(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        // the first tick fires immediately; polling starts one interval in
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("delay monitor stopping");
                    return;
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        debug!("running delay detection");

        let critical = match self.influx.query(&queries::critical_delays(&self.bucket)).await {
            Ok(records) => critical_alerts(&records),
            Err(e) => {
                warn!(error = %e, "critical delay query failed, skipping tick");
                return;
            }
        };
        let sudden = match self.influx.query(&queries::sudden_drops(&self.bucket)).await {
            Ok(records) => sudden_alerts(&records),
            Err(e) => {
                warn!(error = %e, "sudden severity drop query failed, skipping tick");
                return;
            }
        };

        if critical.is_empty() && sudden.is_empty() {
            info!("no line anomalies detected");
            return;
        }
        // critical alerts always go out before sudden ones within a tick
        if !critical.is_empty() {
            self.publish_batch(AlertType::CriticalDelay, critical).await;
        }
        if !sudden.is_empty() {
            self.publish_batch(AlertType::SuddenServiceWorsening, sudden)
                .await;
        }
    }

    async fn publish_batch(&self, alert_type: AlertType, alerts: Vec<Alert>) {
        let count = alerts.len();
        let payload = NotificationPayload {
            alert_type,
            alerts,
            generated_at: Utc::now(),
        };
        let routing_key = match alert_type {
            AlertType::CriticalDelay => KEY_TRAFFIC_CRITICAL,
            AlertType::SuddenServiceWorsening => KEY_TRAFFIC_SUDDEN,
        };
        match self
            .publisher
            .publish_json(routing_key, &payload, (HEADER_ALERT_TYPE, alert_type.as_str()))
            .await
        {
            Ok(()) => info!(
                alert_type = alert_type.as_str(),
                count, "alert batch published"
            ),
            Err(e) => warn!(
                alert_type = alert_type.as_str(),
                error = %e,
                "failed to publish alert batch"
            ),
        }
    }
}

fn parse_timestamp(record: &FluxRecord) -> Option<DateTime<Utc>> {
    let raw = record.get("_time")?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Map critical-delay rows to alerts. Rows missing the grouping tags or a
/// parseable time are skipped.
pub(crate) fn critical_alerts(records: &[FluxRecord]) -> Vec<Alert> {
    records
        .iter()
        .filter_map(|record| {
            let line_name = record.get("line_name")?.clone();
            let mode_name = record.get("mode_name")?.clone();
            let timestamp = parse_timestamp(record)?;
            let status_description = record.get("status_severity_description")?.clone();
            let reason = record
                .get("reason")
                .filter(|reason| !reason.is_empty())
                .cloned();
            Some(Alert {
                line_name,
                mode_name,
                timestamp,
                detail: AlertDetail::CriticalDelay {
                    status_description,
                    reason,
                },
            })
        })
        .collect()
}

/// Map severity-drop rows to alerts.
pub(crate) fn sudden_alerts(records: &[FluxRecord]) -> Vec<Alert> {
    records
        .iter()
        .filter_map(|record| {
            let line_name = record.get("line_name")?.clone();
            let mode_name = record.get("mode_name")?.clone();
            let timestamp = parse_timestamp(record)?;
            let severity_drop: f64 = record.get("_value")?.parse().ok()?;
            Some(Alert {
                line_name,
                mode_name,
                timestamp,
                detail: AlertDetail::SuddenServiceWorsening { severity_drop },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(pairs: &[(&str, &str)]) -> FluxRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>()
    }

    #[test]
    fn maps_critical_rows_to_alerts() {
        let records = vec![record(&[
            ("_time", "2025-06-01T08:30:00Z"),
            ("line_name", "jubilee"),
            ("mode_name", "tube"),
            ("status_severity_description", "Severe Delays"),
            ("reason", "signal failure"),
        ])];
        let alerts = critical_alerts(&records);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].line_name, "jubilee");
        match &alerts[0].detail {
            AlertDetail::CriticalDelay {
                status_description,
                reason,
            } => {
                assert_eq!(status_description, "Severe Delays");
                assert_eq!(reason.as_deref(), Some("signal failure"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn empty_reason_becomes_none() {
        let records = vec![record(&[
            ("_time", "2025-06-01T08:30:00Z"),
            ("line_name", "central"),
            ("mode_name", "tube"),
            ("status_severity_description", "Closed"),
            ("reason", ""),
        ])];
        let alerts = critical_alerts(&records);
        match &alerts[0].detail {
            AlertDetail::CriticalDelay { reason, .. } => assert!(reason.is_none()),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn maps_sudden_rows_and_parses_the_drop() {
        let records = vec![record(&[
            ("_time", "2025-06-01T08:30:00Z"),
            ("line_name", "district"),
            ("mode_name", "tube"),
            ("_value", "-4"),
        ])];
        let alerts = sudden_alerts(&records);
        assert_eq!(alerts.len(), 1);
        match &alerts[0].detail {
            AlertDetail::SuddenServiceWorsening { severity_drop } => {
                assert_eq!(*severity_drop, -4.0)
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn rows_missing_tags_or_time_are_skipped() {
        let records = vec![
            record(&[("_time", "2025-06-01T08:30:00Z"), ("line_name", "victoria")]),
            record(&[
                ("_time", "not-a-time"),
                ("line_name", "victoria"),
                ("mode_name", "tube"),
                ("_value", "-5"),
            ]),
            record(&[
                ("line_name", "victoria"),
                ("mode_name", "tube"),
                ("_value", "bogus"),
            ]),
        ];
        assert!(sudden_alerts(&records).is_empty());
        assert!(critical_alerts(&records).is_empty());
    }
}
