// Configuration management

use crate::core::errors::AccessError;
use secrecy::SecretString;
use std::env;
use std::path::{Path, PathBuf};

/// Runtime configuration loaded from environment variables
///
/// Keys are kept as secrets so they never show up in `Debug` output.
#[derive(Debug, Clone)]
pub struct Config {
    // Supabase project
    pub supabase_url: String,
    pub supabase_anon_key: SecretString,
    pub supabase_service_role_key: Option<SecretString>,

    // Public origin used for email redirect links
    pub site_url: String,

    pub auth_request_timeout_secs: u64,

    // Role cache
    pub role_cache_ttl_secs: u64,
    pub role_cache_max_capacity: u64,

    pub crime_catalog_path: Option<PathBuf>,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    pub fn from_env() -> Result<Self, AccessError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok();
        }

        let config = Self {
            supabase_url: Self::get_required_env("SUPABASE_URL")?,
            supabase_anon_key: SecretString::new(Self::get_required_env("SUPABASE_ANON_KEY")?),
            supabase_service_role_key: Self::get_optional_env("SUPABASE_SERVICE_ROLE_KEY")
                .map(SecretString::new),
            site_url: Self::get_env_or_default("SITE_URL", "http://localhost:8080"),
            auth_request_timeout_secs: Self::parse_u64_or_default("AUTH_REQUEST_TIMEOUT_SECS", 10)?,
            role_cache_ttl_secs: Self::parse_u64_or_default("ROLE_CACHE_TTL_SECS", 300)?,
            role_cache_max_capacity: Self::parse_u64_or_default("ROLE_CACHE_MAX_CAPACITY", 1000)?,
            crime_catalog_path: Self::get_optional_env("CRIME_CATALOG_PATH").map(PathBuf::from),
            log_level: Self::get_env_or_default("LOG_LEVEL", "info"),
            log_format: Self::get_env_or_default("LOG_FORMAT", "text"),
        };

        config.validate()?;
        Ok(config)
    }

    fn get_env_or_default(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    fn get_optional_env(key: &str) -> Option<String> {
        match env::var(key) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }

    fn get_required_env(key: &str) -> Result<String, AccessError> {
        let value = env::var(key)
            .map_err(|_| AccessError::ConfigurationError(format!("{} not set", key)))?;

        if value.trim().is_empty() {
            return Err(AccessError::ConfigurationError(format!("{} is empty", key)));
        }
        Ok(value)
    }

    fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, AccessError> {
        match env::var(key) {
            Ok(value) => Self::parse_u64(&value, key),
            Err(_) => Ok(default),
        }
    }

    fn parse_u64(value: &str, key: &str) -> Result<u64, AccessError> {
        let parsed = value.trim().parse::<u64>().map_err(|e| {
            AccessError::ConfigurationError(format!("Invalid {} value '{}': {}", key, value, e))
        })?;

        if parsed == 0 {
            return Err(AccessError::ConfigurationError(format!(
                "{} must be greater than 0",
                key
            )));
        }
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), AccessError> {
        Self::validate_url(&self.supabase_url, "SUPABASE_URL")?;
        Self::validate_url(&self.site_url, "SITE_URL")?;

        if let Some(ref path) = self.crime_catalog_path {
            Self::validate_file_path(path, "Crime catalog file")?;
        }

        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;
        Ok(())
    }

    fn validate_file_path(path: &Path, description: &str) -> Result<(), AccessError> {
        if !path.is_file() {
            return Err(AccessError::ConfigurationError(format!(
                "{} not found at {:?}",
                description, path
            )));
        }

        std::fs::File::open(path).map_err(|e| {
            AccessError::ConfigurationError(format!(
                "Cannot read {} at {:?}: {}",
                description, path, e
            ))
        })?;
        Ok(())
    }

    fn validate_url(url: &str, key: &str) -> Result<(), AccessError> {
        let parsed = url::Url::parse(url).map_err(|e| {
            AccessError::ConfigurationError(format!("Invalid {} '{}': {}", key, url, e))
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AccessError::ConfigurationError(format!(
                "{} must be an http(s) URL",
                key
            )));
        }
        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<(), AccessError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(AccessError::ConfigurationError(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), AccessError> {
        if format != "json" && format != "text" {
            return Err(AccessError::ConfigurationError(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }

    /// Configuration for tests; no environment access or file validation
    pub fn test_config() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: SecretString::new("test-anon-key".to_string()),
            supabase_service_role_key: None,
            site_url: "http://localhost:8080".to_string(),
            auth_request_timeout_secs: 5,
            role_cache_ttl_secs: 300,
            role_cache_max_capacity: 1000,
            crime_catalog_path: None,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}
