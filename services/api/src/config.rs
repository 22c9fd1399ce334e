use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:5173,http://localhost";

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Absent keys are reported per request, not at startup.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    /// `["*"]` allows any origin.
    pub cors_origins: Vec<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let openai_base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com".to_string())
            .trim_end_matches('/')
            .to_string();
        if !openai_base_url.starts_with("http://") && !openai_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "OPENAI_BASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", openai_base_url),
            ));
        }

        let realtime_model =
            std::env::var("REALTIME_MODEL").unwrap_or_else(|_| "gpt-realtime".to_string());
        let realtime_voice = std::env::var("REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string());

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            openai_base_url,
            realtime_model,
            realtime_voice,
            cors_origins,
            log_level,
        })
    }
}
