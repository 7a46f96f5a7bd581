use std::path::Path;

use tracing::{info, warn};

use crate::error::AppError;

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Runtime settings that live outside Rocket's own figment configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session_ttl_hours: i64,
    pub session_cleanup_interval_secs: u64,
    pub otlp_endpoint: Option<String>,
    pub otlp_api_key: Option<String>,
    pub deployment_environment: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Internal("DATABASE_URL is not set".to_string()))?;

        Ok(Self {
            database_url,
            session_ttl_hours: parse_var("SESSION_TTL_HOURS", 24)?,
            session_cleanup_interval_secs: parse_var("SESSION_CLEANUP_INTERVAL_SECS", 3600)?,
            otlp_endpoint: optional_var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otlp_api_key: optional_var("OTEL_API_KEY"),
            deployment_environment: optional_var("DEPLOYMENT_ENVIRONMENT")
                .unwrap_or_else(|| "development".to_string()),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            session_ttl_hours: 24,
            session_cleanup_interval_secs: 3600,
            otlp_endpoint: None,
            otlp_api_key: None,
            deployment_environment: "development".to_string(),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Internal(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(default),
    }
}
