//! TfL journey-planning and crowding API clients.

use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use reqwest::{header, Client};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const TFL_BASE_URL: &str = "https://api.tfl.gov.uk";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// The TfL edge rejects requests without a browser-looking agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

#[derive(Debug, Error)]
pub enum TflError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("TfL API returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyResponse {
    #[serde(default)]
    pub journeys: Vec<Journey>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journey {
    pub duration: i32,
    #[serde(default)]
    pub legs: Vec<JourneyLeg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyLeg {
    pub departure_time: String,
    pub arrival_time: String,
    pub departure_point: StopPoint,
    pub arrival_point: StopPoint,
    pub instruction: Instruction,
    #[serde(default)]
    pub route_options: Vec<RouteOption>,
    #[serde(default)]
    pub path: PathInfo,
    pub mode: Mode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPoint {
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub naptan_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detailed: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOption {
    #[serde(default)]
    pub name: String,
    pub line_identifier: LineIdentifier,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineIdentifier {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mode {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathInfo {
    #[serde(default)]
    pub stop_points: Vec<StopPointRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPointRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrowdingResponse {
    #[serde(default)]
    pub time_bands: Vec<TimeBandCrowding>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBandCrowding {
    pub time_band: String,
    #[serde(default)]
    pub percentage_of_base_line: f64,
}

pub struct TflClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl TflClient {
    pub fn new(api_key: String) -> Result<Self, TflError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key,
            base_url: TFL_BASE_URL.to_string(),
        })
    }

    /// Candidate journeys between two stop codes, departing at the given
    /// local time.
    pub async fn fetch_journeys(
        &self,
        from: &str,
        to: &str,
        departure: DateTime<Tz>,
    ) -> Result<JourneyResponse, TflError> {
        let date = departure.format("%Y%m%d").to_string();
        let time = departure.format("%H%M").to_string();
        let url = format!("{}/Journey/JourneyResults/{from}/to/{to}", self.base_url);
        debug!(from, to, %date, %time, "fetching journeys");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("date", date.as_str()),
                ("time", time.as_str()),
                ("timeIs", "Departing"),
                ("app_key", self.api_key.as_str()),
            ])
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TflError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Crowding baseline percentages for a stop on a given weekday
    /// (`MON`..`SUN`).
    pub async fn fetch_crowding(
        &self,
        naptan: &str,
        weekday: &str,
    ) -> Result<CrowdingResponse, TflError> {
        let url = format!("{}/crowding/{naptan}/{weekday}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TflError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}
