use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Server-side voice activity detection.
#[derive(Clone, Debug, PartialEq)]
pub struct VadConfig {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub backend_url: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub transcription_model: String,
    pub vad: VadConfig,
    pub move_settle_timeout: Duration,
    pub negotiation_timeout: Duration,
    pub geocoder_url: String,
    pub capture_image_path: Option<PathBuf>,
    pub export_dir: PathBuf,
    pub input_device: Option<String>,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let backend_url = var_or("BACKEND_URL", "http://localhost:8000")
            .trim_end_matches('/')
            .to_string();
        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "BACKEND_URL".to_string(),
                format!("'{}' is not an http(s) URL", backend_url),
            ));
        }

        let threshold: f32 = parse_var("VAD_THRESHOLD", 0.5)?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue(
                "VAD_THRESHOLD".to_string(),
                format!("{} is outside 0.0..=1.0", threshold),
            ));
        }
        let vad = VadConfig {
            threshold,
            prefix_padding_ms: parse_var("VAD_PREFIX_PADDING_MS", 300)?,
            silence_duration_ms: parse_var("VAD_SILENCE_DURATION_MS", 500)?,
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            backend_url,
            realtime_model: var_or("REALTIME_MODEL", "gpt-realtime"),
            realtime_voice: var_or("REALTIME_VOICE", "alloy"),
            transcription_model: var_or("TRANSCRIPTION_MODEL", "whisper-1"),
            vad,
            move_settle_timeout: Duration::from_millis(parse_var("MOVE_SETTLE_TIMEOUT_MS", 3000)?),
            negotiation_timeout: Duration::from_millis(parse_var("NEGOTIATION_TIMEOUT_MS", 10_000)?),
            geocoder_url: var_or("GEOCODER_URL", DEFAULT_GEOCODER_URL),
            capture_image_path: std::env::var("CAPTURE_IMAGE_PATH").ok().map(PathBuf::from),
            export_dir: PathBuf::from(var_or("EXPORT_DIR", ".")),
            input_device: std::env::var("INPUT_DEVICE").ok().filter(|s| !s.trim().is_empty()),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "BACKEND_URL",
        "REALTIME_MODEL",
        "REALTIME_VOICE",
        "TRANSCRIPTION_MODEL",
        "VAD_THRESHOLD",
        "VAD_PREFIX_PADDING_MS",
        "VAD_SILENCE_DURATION_MS",
        "MOVE_SETTLE_TIMEOUT_MS",
        "NEGOTIATION_TIMEOUT_MS",
        "GEOCODER_URL",
        "CAPTURE_IMAGE_PATH",
        "EXPORT_DIR",
        "INPUT_DEVICE",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();
        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.backend_url, "http://localhost:8000");
        assert_eq!(config.realtime_model, "gpt-realtime");
        assert_eq!(config.realtime_voice, "alloy");
        assert_eq!(config.transcription_model, "whisper-1");
        assert_eq!(
            config.vad,
            VadConfig {
                threshold: 0.5,
                prefix_padding_ms: 300,
                silence_duration_ms: 500
            }
        );
        assert_eq!(config.move_settle_timeout, Duration::from_millis(3000));
        assert_eq!(config.negotiation_timeout, Duration::from_secs(10));
        assert_eq!(config.geocoder_url, DEFAULT_GEOCODER_URL);
        assert_eq!(config.capture_image_path, None);
        assert_eq!(config.export_dir, PathBuf::from("."));
        assert_eq!(config.input_device, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BACKEND_URL", "https://segment.example.com/");
            env::set_var("VAD_THRESHOLD", "0.7");
            env::set_var("MOVE_SETTLE_TIMEOUT_MS", "1500");
            env::set_var("CAPTURE_IMAGE_PATH", "/tmp/view.png");
            env::set_var("INPUT_DEVICE", "USB");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.backend_url, "https://segment.example.com");
        assert_eq!(config.vad.threshold, 0.7);
        assert_eq!(config.move_settle_timeout, Duration::from_millis(1500));
        assert_eq!(config.capture_image_path, Some(PathBuf::from("/tmp/view.png")));
        assert_eq!(config.input_device.as_deref(), Some("USB"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_rejects_invalid_numbers() {
        clear_env_vars();
        unsafe {
            env::set_var("VAD_SILENCE_DURATION_MS", "soon");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VAD_SILENCE_DURATION_MS"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        clear_env_vars();
        unsafe {
            env::set_var("VAD_THRESHOLD", "1.5");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VAD_THRESHOLD"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_non_http_backend() {
        clear_env_vars();
        unsafe {
            env::set_var("BACKEND_URL", "localhost:8000");
        }
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::InvalidValue(var, _) if var == "BACKEND_URL"
        ));
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }
        let err = Config::from_env().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for environment variable RUST_LOG: 'not-a-level' is not a valid log level"
        );
    }
}
