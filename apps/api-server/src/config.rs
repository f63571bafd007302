//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::code::{DEFAULT_CODE_LENGTH, MAX_CODE_LENGTH};
use domain::service::DEFAULT_MAX_ATTEMPTS;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Sqlite
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
#[error("Configuration error for {field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl ConfigError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 5000)
    pub port: u16,
    /// Prefix for generated short URLs, no trailing slash
    pub base_url: String,
    /// Storage provider (default: sqlite)
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: PathBuf,
    /// Generated code length
    pub code_length: usize,
    /// Bound on code generation attempts per create
    pub max_code_attempts: u32,
    /// Bound on every store operation
    pub store_timeout: Duration,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = parse_or("PORT", get("PORT"), 5000)?;

        // Base URL
        let base_url = match get("BASE_URL") {
            Some(raw) => {
                let normalized = http_common::normalize_base_url(&raw);
                domain::validate::validate_original_url(&normalized).map_err(|_| {
                    ConfigError::new("BASE_URL", format!("'{raw}' is not an absolute http(s) URL"))
                })?;
                normalized
            }
            None => format!("http://localhost:{port}"),
        };

        let storage_provider =
            StorageProvider::from_str(&get("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()));

        let db_path = PathBuf::from(
            get("DB_PATH").unwrap_or_else(|| "./data/shortlinks.db".to_string()),
        );

        let code_length: usize = parse_or("CODE_LENGTH", get("CODE_LENGTH"), DEFAULT_CODE_LENGTH)?;
        if !(1..=MAX_CODE_LENGTH).contains(&code_length) {
            return Err(ConfigError::new(
                "CODE_LENGTH",
                format!("must be between 1 and {MAX_CODE_LENGTH}"),
            ));
        }

        let max_code_attempts: u32 =
            parse_or("MAX_CODE_ATTEMPTS", get("MAX_CODE_ATTEMPTS"), DEFAULT_MAX_ATTEMPTS)?;
        if max_code_attempts == 0 {
            return Err(ConfigError::new("MAX_CODE_ATTEMPTS", "must be at least 1"));
        }

        let timeout_ms: u64 = parse_or("STORE_TIMEOUT_MS", get("STORE_TIMEOUT_MS"), 2000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::new("STORE_TIMEOUT_MS", "must be at least 1"));
        }

        // CORS allow origin
        let cors_origin_str = get("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| {
                ConfigError::new(
                    "CORS_ALLOW_ORIGIN",
                    format!("Invalid header value '{}': {}", cors_origin_str, e),
                )
            })?
        };

        let log_format = LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            port,
            base_url,
            storage_provider,
            db_path,
            code_length,
            max_code_attempts,
            store_timeout: Duration::from_millis(timeout_ms),
            cors_allow_origin,
            log_format,
        })
    }

    /// Log warnings about configuration that is fine for development only.
    pub fn warn_if_ephemeral(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: links are lost when the server stops");
        }
        if self.base_url.contains("://localhost") || self.base_url.contains("://127.0.0.1") {
            tracing::warn!(base_url = %self.base_url, "short URLs point at a local address");
        }
    }
}

fn parse_or<T: FromStr>(field: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(s) => s
            .trim()
            .parse()
            .map_err(|e| ConfigError::new(field, format!("'{}': {}", s, e))),
        None => Ok(default),
    }
}
