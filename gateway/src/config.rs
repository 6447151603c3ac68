use optimaldn_common::config::{env_or, required_env, ConfigError};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: String,
    pub route_planner_addr: String,
    pub user_service_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: env_or("API_PORT", "8080"),
            route_planner_addr: required_env("ROUTE_PLANNER_ADDR")?,
            user_service_addr: required_env("USER_SERVICE_ADDR")?,
        })
    }
}
