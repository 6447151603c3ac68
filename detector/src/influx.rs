//! Flux query client for the line-status time series.
//!
//! Queries go to the InfluxDB v2 HTTP query API; responses come back as
//! (possibly annotated) CSV, decoded into string-keyed records.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::config::InfluxConfig;

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum InfluxError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("query returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("CSV decode error: {0}")]
    Csv(#[from] csv::Error),
}

/// One decoded result row, keyed by column name.
pub type FluxRecord = HashMap<String, String>;

pub struct InfluxClient {
    http: Client,
    url: String,
    org: String,
    token: String,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Result<Self, InfluxError> {
        let http = Client::builder().timeout(QUERY_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            token: config.token.clone(),
        })
    }

    pub async fn query(&self, flux: &str) -> Result<Vec<FluxRecord>, InfluxError> {
        let url = format!("{}/api/v2/query", self.url);
        let response = self
            .http
            .post(&url)
            .query(&[("org", self.org.as_str())])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(flux.to_string())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(InfluxError::Status(response.status()));
        }
        let body = response.text().await?;
        Ok(decode_annotated_csv(&body)?)
    }
}

/// Decode a Flux CSV response. The stream may carry several tables, each
/// with its own header row; annotation rows start with `#`.
pub(crate) fn decode_annotated_csv(body: &str) -> Result<Vec<FluxRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut header: Vec<String> = Vec::new();
    let mut records = Vec::new();

    for row in reader.records() {
        let row = row?;
        if row.iter().all(|field| field.is_empty()) {
            continue;
        }
        if row.get(0).is_some_and(|field| field.starts_with('#')) {
            continue;
        }
        // Each table restates its header; `_time` is present in every
        // projection this service issues.
        if row.iter().any(|field| field == "_time") {
            header = row.iter().map(str::to_string).collect();
            continue;
        }
        if header.is_empty() {
            continue;
        }
        let mut record = FluxRecord::new();
        for (name, value) in header.iter().zip(row.iter()) {
            if !name.is_empty() {
                record.insert(name.clone(), value.to_string());
            }
        }
        records.push(record);
    }

    Ok(records)
}
