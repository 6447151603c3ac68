use optimaldn_common::config::{broker_url, required_env, ConfigError};

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub influx: InfluxConfig,
    pub broker_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            influx: InfluxConfig {
                url: required_env("INFLUXDB_URL")?,
                org: required_env("INFLUXDB_ORG")?,
                bucket: required_env("INFLUXDB_BUCKET")?,
                token: required_env("INFLUXDB_TOKEN")?,
            },
            broker_url: broker_url(),
        })
    }
}
