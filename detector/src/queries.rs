//! The two anomaly range queries over the `tfl_line_status` measurement.

/// Latest critical status per line over the last 15 minutes.
pub fn critical_delays(bucket: &str) -> String {
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: -15m)
  |> filter(fn: (r) => r._measurement == "tfl_line_status")
  |> filter(fn: (r) =>
    r.status_severity_description == "Severe Delays" or
    r.status_severity_description == "Part Suspended" or
    r.status_severity_description == "Closed"
  )
  |> group(columns: ["line_name", "mode_name"])
  |> last()
  |> keep(columns: ["_time", "line_name", "mode_name", "status_severity_description", "reason"])
"#
    )
}

/// Severity first-differences below -3.0 per line over the last 30 minutes.
pub fn sudden_drops(bucket: &str) -> String {
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: -30m)
  |> filter(fn: (r) => r._measurement == "tfl_line_status" and r._field == "status_severity")
  |> group(columns: ["line_name", "mode_name"])
  |> sort(columns: ["_time"])
  |> difference(columns: ["_value"])
  |> filter(fn: (r) => r._value < -3.0)
  |> keep(columns: ["_time", "line_name", "mode_name", "_value"])
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_query_filters_the_three_critical_statuses() {
        let flux = critical_delays("tfl");
        assert!(flux.contains(r#"from(bucket: "tfl")"#));
        assert!(flux.contains("range(start: -15m)"));
        assert!(flux.contains("Severe Delays"));
        assert!(flux.contains("Part Suspended"));
        assert!(flux.contains("Closed"));
        assert!(flux.contains("last()"));
    }

    #[test]
    fn sudden_query_uses_the_strict_threshold() {
        let flux = sudden_drops("tfl");
        assert!(flux.contains("range(start: -30m)"));
        assert!(flux.contains("difference(columns: [\"_value\"])"));
        assert!(flux.contains("r._value < -3.0"));
    }
}
