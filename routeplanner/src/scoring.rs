//! Journey scoring helpers and current-position estimation. Pure functions;
//! the planner wires them to the TfL clients.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use optimaldn_common::schema::{UserRoute, LEG_TIME_FORMAT};
use thiserror::Error;

/// All journey wall-clock times are local to this zone.
pub const LONDON: chrono_tz::Tz = chrono_tz::Europe::London;

/// Floor to the enclosing 15-minute crowding band, e.g. 09:14 →
/// "09:00-09:15". Wraps at midnight: 23:45 → "23:45-00:00".
pub fn time_to_band(t: NaiveTime) -> String {
    let start = t.hour() * 60 + (t.minute() / 15) * 15;
    let end = (start + 15) % (24 * 60);
    format!(
        "{:02}:{:02}-{:02}:{:02}",
        start / 60,
        start % 60,
        end / 60,
        end % 60
    )
}

/// Band for a leg timestamp in the journey wall-clock format.
pub fn leg_time_band(time_str: &str) -> Result<String, chrono::ParseError> {
    let t = NaiveDateTime::parse_from_str(time_str, LEG_TIME_FORMAT)?;
    Ok(time_to_band(t.time()))
}

/// Crowding API day key: three-letter uppercase weekday.
pub fn weekday_key(date: NaiveDate) -> String {
    date.format("%a").to_string().to_uppercase()
}

/// The crowding API reports NaPTAN hub ids ("940G…") under a "9400…" code.
pub fn normalize_stop_id(stop_id: &str) -> String {
    match stop_id.strip_prefix("940G") {
        Some(rest) => format!("9400{rest}"),
        None => stop_id.to_string(),
    }
}

/// `duration * (1 + avg crowding)`; plain duration when no crowding samples
/// matched. Lower is better.
pub fn score(total_crowding: f64, stop_count: usize, duration: i32) -> f64 {
    let avg_crowding = if stop_count > 0 {
        total_crowding / stop_count as f64
    } else {
        0.0
    };
    f64::from(duration) * (1.0 + avg_crowding)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EstimateError {
    #[error("route has no legs")]
    EmptyRoute,
    #[error("journey already completed")]
    JourneyCompleted,
    #[error("unable to estimate current stop from the leg timetable")]
    CannotEstimate,
}

/// The stop the user is assumed to be at right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatedStop {
    pub stop_id: String,
    pub stop_name: String,
}

/// Estimate the current stop purely from the leg timetable: find the leg
/// containing `now`, scale elapsed time to an index into its stop list.
pub fn estimate_current_stop(
    route: &UserRoute,
    now: NaiveDateTime,
) -> Result<EstimatedStop, EstimateError> {
    let last = route.legs.last().ok_or(EstimateError::EmptyRoute)?;
    if let Ok(journey_end) = NaiveDateTime::parse_from_str(&last.end_time, LEG_TIME_FORMAT) {
        if now > journey_end {
            return Err(EstimateError::JourneyCompleted);
        }
    }

    for leg in &route.legs {
        let (Ok(start), Ok(end)) = (
            NaiveDateTime::parse_from_str(&leg.start_time, LEG_TIME_FORMAT),
            NaiveDateTime::parse_from_str(&leg.end_time, LEG_TIME_FORMAT),
        ) else {
            continue;
        };
        if now < start || now >= end || leg.stop_ids.is_empty() {
            continue;
        }
        let span = (end - start).num_seconds();
        let progress = if span > 0 {
            (now - start).num_seconds() as f64 / span as f64
        } else {
            0.0
        };
        let index =
            ((progress * leg.stop_ids.len() as f64) as usize).min(leg.stop_ids.len() - 1);
        return Ok(EstimatedStop {
            stop_id: leg.stop_ids[index].clone(),
            stop_name: leg.stops.get(index).cloned().unwrap_or_default(),
        });
    }

    Err(EstimateError::CannotEstimate)
}
