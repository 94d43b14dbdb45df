// Configuration management

use crate::core::errors::ServiceError;
use secrecy::Secret;
use std::env;

/// Minimum bcrypt cost accepted from the environment
pub const MIN_BCRYPT_COST: u32 = 12;

/// Minimum length of the JWT signing secret in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Application configuration loaded from environment variables
///
/// Secrets are wrapped in `secrecy::Secret` so they never reach logs through `Debug`.
#[derive(Debug)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub body_size_limit_bytes: usize,

    // Database configuration (optional; in-memory store when unset)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Token configuration
    pub jwt_secret: Secret<String>,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub token_purge_interval_secs: u64,
    pub bcrypt_cost: u32,

    // Blob store (Cloudinary) configuration
    pub cloudinary_base_url: String,
    pub cloudinary_cloud_name: String,
    pub cloudinary_api_key: String,
    pub cloudinary_api_secret: Secret<String>,
    pub cloudinary_folder: String,

    // Verification oracle (Onfido) configuration
    pub onfido_base_url: String,
    pub onfido_api_token: Secret<String>,
    pub onfido_webhook_token: Option<Secret<String>>,

    // Upstream call configuration
    pub upstream_timeout_secs: u64,
    pub max_upload_bytes: usize,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    /// Validates all required fields and URLs.
    pub fn from_env() -> Result<Self, ServiceError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok();
        }

        let cloud_name = Self::get_required("CLOUDINARY_CLOUD_NAME")?;
        let onfido_base_url = match Self::get_optional_env("ONFIDO_BASE_URL")? {
            Some(url) => url,
            None => Self::onfido_region_url(&Self::get_env_or_default("ONFIDO_REGION", "EU")?)?,
        };

        let config = Self {
            bind_address: Self::get_env_or_default("BIND_ADDRESS", "0.0.0.0")?,
            port: Self::parse_port()?,
            request_timeout_secs: Self::parse_u64_or_default("REQUEST_TIMEOUT_SECS", 60)?,
            body_size_limit_bytes: Self::parse_usize_or_default("BODY_SIZE_LIMIT_BYTES", 12 * 1024 * 1024)?,
            database_url: Self::get_optional_env("DATABASE_URL")?,
            database_max_connections: Self::parse_u64_or_default("DATABASE_MAX_CONNECTIONS", 10)? as u32,
            jwt_secret: Secret::new(Self::get_required("JWT_SECRET")?),
            access_token_ttl_secs: Self::parse_u64_or_default("ACCESS_TOKEN_TTL_SECS", 3600)?,
            refresh_token_ttl_secs: Self::parse_u64_or_default("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 3600)?,
            token_purge_interval_secs: Self::parse_u64_or_default("TOKEN_PURGE_INTERVAL_SECS", 3600)?,
            bcrypt_cost: Self::parse_u64_or_default("BCRYPT_COST", MIN_BCRYPT_COST as u64)? as u32,
            cloudinary_base_url: format!(
                "{}/{}",
                Self::get_env_or_default("CLOUDINARY_BASE_URL", "https://api.cloudinary.com/v1_1")?
                    .trim_end_matches('/'),
                cloud_name
            ),
            cloudinary_cloud_name: cloud_name,
            cloudinary_api_key: Self::get_required("CLOUDINARY_API_KEY")?,
            cloudinary_api_secret: Secret::new(Self::get_required("CLOUDINARY_API_SECRET")?),
            cloudinary_folder: Self::get_env_or_default("CLOUDINARY_FOLDER", "securedbank/kyc")?,
            onfido_base_url,
            onfido_api_token: Secret::new(Self::get_required("ONFIDO_API_TOKEN")?),
            onfido_webhook_token: Self::get_optional_env("ONFIDO_WEBHOOK_TOKEN")?.map(Secret::new),
            upstream_timeout_secs: Self::parse_u64_or_default("UPSTREAM_TIMEOUT_SECS", 15)?,
            max_upload_bytes: Self::parse_usize_or_default("MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            log_level: Self::get_env_or_default("LOG_LEVEL", "info")?,
            log_format: Self::get_env_or_default("LOG_FORMAT", "json")?,
        };

        config.validate()?;

        Ok(config)
    }

    fn get_env_or_default(key: &str, default: &str) -> Result<String, ServiceError> {
        Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
    }

    fn get_optional_env(key: &str) -> Result<Option<String>, ServiceError> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    fn get_required(key: &str) -> Result<String, ServiceError> {
        let value = env::var(key)
            .map_err(|_| ServiceError::ConfigurationError(format!("{} not set", key)))?;

        if value.is_empty() {
            return Err(ServiceError::ConfigurationError(format!("{} is empty", key)));
        }

        Ok(value)
    }

    fn parse_port() -> Result<u16, ServiceError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "5000".to_string());
        let port = port_str.parse::<u16>().map_err(|e| {
            ServiceError::ConfigurationError(format!("Invalid PORT value '{}': {}", port_str, e))
        })?;

        if port == 0 {
            return Err(ServiceError::ConfigurationError(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }

        Ok(port)
    }

    /// Parse u64 from environment variable or return default
    fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, ServiceError> {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.parse::<u64>().map_err(|e| {
                    ServiceError::ConfigurationError(format!("Invalid {} value '{}': {}", key, value, e))
                })?;

                if parsed == 0 {
                    return Err(ServiceError::ConfigurationError(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }

                Ok(parsed)
            }
            _ => Ok(default),
        }
    }

    /// Parse usize from environment variable or return default
    fn parse_usize_or_default(key: &str, default: usize) -> Result<usize, ServiceError> {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.parse::<usize>().map_err(|e| {
                    ServiceError::ConfigurationError(format!("Invalid {} value '{}': {}", key, value, e))
                })?;

                if parsed == 0 {
                    return Err(ServiceError::ConfigurationError(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }

                Ok(parsed)
            }
            _ => Ok(default),
        }
    }

    /// Map an Onfido data-center region to its API base URL
    fn onfido_region_url(region: &str) -> Result<String, ServiceError> {
        let host = match region.to_uppercase().as_str() {
            "EU" => "api.eu.onfido.com",
            "US" => "api.us.onfido.com",
            "CA" => "api.ca.onfido.com",
            other => {
                return Err(ServiceError::ConfigurationError(format!(
                    "Invalid ONFIDO_REGION '{}': must be one of EU, US, CA",
                    other
                )))
            }
        };
        Ok(format!("https://{}/v3.6", host))
    }

    fn validate(&self) -> Result<(), ServiceError> {
        use secrecy::ExposeSecret;

        if self.jwt_secret.expose_secret().len() < MIN_JWT_SECRET_LEN {
            return Err(ServiceError::ConfigurationError(format!(
                "JWT_SECRET must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }

        if self.bcrypt_cost < MIN_BCRYPT_COST || self.bcrypt_cost > 31 {
            return Err(ServiceError::ConfigurationError(format!(
                "BCRYPT_COST must be between {} and 31",
                MIN_BCRYPT_COST
            )));
        }

        if self.refresh_token_ttl_secs <= self.access_token_ttl_secs {
            return Err(ServiceError::ConfigurationError(
                "REFRESH_TOKEN_TTL_SECS must exceed ACCESS_TOKEN_TTL_SECS".to_string(),
            ));
        }

        if self.max_upload_bytes * 2 > self.body_size_limit_bytes {
            return Err(ServiceError::ConfigurationError(
                "BODY_SIZE_LIMIT_BYTES must fit two maximum-size uploads".to_string(),
            ));
        }

        Self::validate_url(&self.cloudinary_base_url, "Cloudinary")?;
        Self::validate_url(&self.onfido_base_url, "Onfido")?;
        if let Some(ref url) = self.database_url {
            Self::validate_url(url, "Database")?;
        }

        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;

        Ok(())
    }

    fn validate_url(url: &str, description: &str) -> Result<(), ServiceError> {
        url::Url::parse(url).map_err(|e| {
            ServiceError::ConfigurationError(format!("Invalid {} URL '{}': {}", description, url, e))
        })?;
        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<(), ServiceError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(ServiceError::ConfigurationError(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), ServiceError> {
        if format != "json" && format != "text" {
            return Err(ServiceError::ConfigurationError(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Create a test configuration
    ///
    /// Bypasses environment loading and validation; uses a low bcrypt cost
    /// so password tests stay fast.
    pub fn test_config() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 30,
            body_size_limit_bytes: 12 * 1024 * 1024,
            database_url: None,
            database_max_connections: 5,
            jwt_secret: Secret::new("test-secret-test-secret-test-secret-0123".to_string()),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            token_purge_interval_secs: 3600,
            bcrypt_cost: 4,
            cloudinary_base_url: "http://127.0.0.1:1/v1_1/test".to_string(),
            cloudinary_cloud_name: "test".to_string(),
            cloudinary_api_key: "test-key".to_string(),
            cloudinary_api_secret: Secret::new("test-api-secret".to_string()),
            cloudinary_folder: "securedbank/kyc".to_string(),
            onfido_base_url: "http://127.0.0.1:1/v3.6".to_string(),
            onfido_api_token: Secret::new("test-onfido-token".to_string()),
            onfido_webhook_token: None,
            upstream_timeout_secs: 5,
            max_upload_bytes: 5 * 1024 * 1024,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}
