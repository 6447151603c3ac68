use optimaldn_common::config::{broker_url, env_or, required_env, ConfigError};

const DEFAULT_STOP_CODES_PATH: &str = "stationCodes.csv";

#[derive(Debug, Clone)]
pub struct Config {
    pub tfl_api_key: String,
    pub database_url: String,
    pub port: String,
    pub stop_codes_path: String,
    pub broker_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            tfl_api_key: required_env("TFL_API_KEY")?,
            database_url: required_env("DATABASE_URL")?,
            port: required_env("RP_PORT")?,
            stop_codes_path: env_or("STOP_CODES_PATH", DEFAULT_STOP_CODES_PATH),
            broker_url: broker_url(),
        })
    }
}
