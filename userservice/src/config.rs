use optimaldn_common::config::{broker_url, env_or, required_env, ConfigError};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: String,
    pub route_planner_addr: String,
    pub api_gateway_url: String,
    pub broker_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            port: required_env("US_PORT")?,
            route_planner_addr: required_env("ROUTE_PLANNER_ADDR")?,
            api_gateway_url: env_or("API_GATEWAY_URL", "http://api_gateway:8080"),
            broker_url: broker_url(),
        })
    }
}
