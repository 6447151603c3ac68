use optimaldn_common::config::{broker_url, required_env, ConfigError};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub broker_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            broker_url: broker_url(),
        })
    }
}
