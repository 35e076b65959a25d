//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub public_dir: PathBuf,
    /// Extra browser origin allowed to call the API with credentials.
    pub cors_origin: Option<String>,
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    /// Chat models in fallback order; never empty.
    pub chat_models: Vec<String>,
    pub tts_model: String,
    pub tts_voice: String,
    pub max_books_per_user: usize,
    pub retry_max_attempts: u32,
    pub retry_initial_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address = parse_var("BIND_ADDRESS", var("BIND_ADDRESS", "0.0.0.0:3001"))?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;
        let public_dir = PathBuf::from(var("PUBLIC_DIR", "./public"));
        let cors_origin = lookup("CORS_ORIGIN").filter(|origin| !origin.trim().is_empty());

        // --- AI Provider Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let openai_api_base = lookup("OPENAI_API_BASE").filter(|base| !base.trim().is_empty());

        let chat_models: Vec<String> = var("CHAT_MODELS", "gpt-4o-mini,gpt-4o")
            .split(',')
            .map(|model| model.trim().to_string())
            .filter(|model| !model.is_empty())
            .collect();
        if chat_models.is_empty() {
            return Err(ConfigError::InvalidValue(
                "CHAT_MODELS".to_string(),
                "at least one model is required".to_string(),
            ));
        }
        let tts_model = var("TTS_MODEL", "tts-1");
        let tts_voice = var("TTS_VOICE", "alloy");

        // --- Limits and Retry Policy ---
        let max_books_per_user = parse_var("MAX_BOOKS_PER_USER", var("MAX_BOOKS_PER_USER", "5"))?;
        let retry_max_attempts = parse_var("RETRY_MAX_ATTEMPTS", var("RETRY_MAX_ATTEMPTS", "5"))?;
        let retry_initial_delay_ms: u64 =
            parse_var("RETRY_INITIAL_DELAY_MS", var("RETRY_INITIAL_DELAY_MS", "1000"))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            public_dir,
            cors_origin,
            openai_api_key,
            openai_api_base,
            chat_models,
            tts_model,
            tts_voice,
            max_books_per_user,
            retry_max_attempts,
            retry_initial_delay: Duration::from_millis(retry_initial_delay_ms),
        })
    }
}

fn parse_var<T>(key: &str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.bind_address.port(), 3001);
        assert!(config.database_url.is_none());
        assert_eq!(config.chat_models, vec!["gpt-4o-mini", "gpt-4o"]);
        assert_eq!(config.max_books_per_user, 5);
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.retry_initial_delay, Duration::from_millis(1000));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(config_from(&[]), Err(ConfigError::MissingVar(_))));
    }

    #[test]
    fn invalid_values_are_reported_with_their_key() {
        let err = config_from(&[("OPENAI_API_KEY", "k"), ("MAX_BOOKS_PER_USER", "many")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "MAX_BOOKS_PER_USER"));

        let err = config_from(&[("OPENAI_API_KEY", "k"), ("CHAT_MODELS", " , ")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "CHAT_MODELS"));
    }

    #[test]
    fn model_list_is_trimmed() {
        let config =
            config_from(&[("OPENAI_API_KEY", "k"), ("CHAT_MODELS", " a , b,,c ")]).unwrap();
        assert_eq!(config.chat_models, vec!["a", "b", "c"]);
    }
}
