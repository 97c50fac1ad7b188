//! Configuration loading for the QuickBooks Online connector.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `QBO_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "QBO_";

/// Application configuration derived from `QBO_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    #[serde(default = "default_resolver_max_depth")]
    pub resolver_max_depth: usize,
    #[serde(default)]
    pub qbo: QboDefaults,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Remote endpoint defaults applied to newly created connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct QboDefaults {
    #[serde(default = "default_authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Minor version sent with read queries.
    #[serde(default = "default_minor_version")]
    pub minor_version: String,
    /// Minor version sent with create and update calls.
    #[serde(default = "default_export_minor_version")]
    pub export_minor_version: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

/// Periodic import scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scheduler_tick_seconds")]
    pub tick_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            crypto_key: None,
            resolver_max_depth: default_resolver_max_depth(),
            qbo: QboDefaults::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for QboDefaults {
    fn default() -> Self {
        Self {
            authorization_endpoint: default_authorization_endpoint(),
            token_endpoint: default_token_endpoint(),
            redirect_uri: default_redirect_uri(),
            api_base_url: default_api_base_url(),
            minor_version: default_minor_version(),
            export_minor_version: default_export_minor_version(),
            scope: default_scope(),
            http_timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_seconds: default_scheduler_tick_seconds(),
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(10..=86_400).contains(&self.tick_seconds) {
            return Err(ConfigError::InvalidSchedulerTick {
                value: self.tick_seconds,
            });
        }
        Ok(())
    }
}

impl QboDefaults {
    /// Endpoints must be absolute URLs; the API base must end with a slash so
    /// realm paths append cleanly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("AUTHORIZATION_ENDPOINT", &self.authorization_endpoint),
            ("TOKEN_ENDPOINT", &self.token_endpoint),
            ("REDIRECT_URI", &self.redirect_uri),
            ("API_BASE_URL", &self.api_base_url),
        ] {
            url::Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
                field,
                value: value.clone(),
                source,
            })?;
        }
        if !self.api_base_url.ends_with('/') {
            return Err(ConfigError::ApiBaseWithoutTrailingSlash {
                value: self.api_base_url.clone(),
            });
        }
        if self.http_timeout_seconds == 0 {
            return Err(ConfigError::InvalidHttpTimeout);
        }
        Ok(())
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec!["[REDACTED]".to_string()];
        }
        if config.crypto_key.is_some() {
            config.crypto_key = Some(b"[REDACTED]".to_vec());
        }
        if config.database_url.contains('@') {
            config.database_url = "[REDACTED]".to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            Some(_) => {}
            None => return Err(ConfigError::MissingCryptoKey),
        }

        if self.profile != "test" && self.operator_tokens.is_empty() {
            return Err(ConfigError::MissingOperatorTokens);
        }

        if !(1..=64).contains(&self.resolver_max_depth) {
            return Err(ConfigError::InvalidResolverDepth {
                value: self.resolver_max_depth,
            });
        }

        self.qbo.validate()?;
        self.scheduler.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://qbo_connector.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_resolver_max_depth() -> usize {
    16
}

fn default_authorization_endpoint() -> String {
    "https://appcenter.intuit.com/connect/oauth2".to_string()
}

fn default_token_endpoint() -> String {
    "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:5000/get_auth_code".to_string()
}

fn default_api_base_url() -> String {
    "https://sandbox-quickbooks.api.intuit.com/v3/company/".to_string()
}

fn default_minor_version() -> String {
    "8".to_string()
}

fn default_export_minor_version() -> String {
    "12".to_string()
}

fn default_scope() -> String {
    "com.intuit.quickbooks.accounting".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    30
}

fn default_scheduler_tick_seconds() -> u64 {
    300
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("no operator tokens configured; set QBO_OPERATOR_TOKEN or QBO_OPERATOR_TOKENS")]
    MissingOperatorTokens,
    #[error("crypto key is missing; set QBO_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("invalid URL for QBO_{field} '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("QBO_API_BASE_URL must end with '/', got '{value}'")]
    ApiBaseWithoutTrailingSlash { value: String },
    #[error("QBO_HTTP_TIMEOUT_SECONDS must be positive")]
    InvalidHttpTimeout,
    #[error("scheduler tick must be between 10 and 86400 seconds, got {value}")]
    InvalidSchedulerTick { value: u64 },
    #[error("resolver max depth must be between 1 and 64, got {value}")]
    InvalidResolverDepth { value: usize },
}

/// Loads configuration using layered `.env` files and `QBO_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads, validates and returns the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr =
            non_empty(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = non_empty(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = non_empty(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url =
            non_empty(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);
        let resolver_max_depth = layered
            .remove("RESOLVER_MAX_DEPTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_resolver_max_depth);

        // Support both single token and comma-separated list
        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = layered.remove("OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let crypto_key = match layered.remove("CRYPTO_KEY") {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                let bytes = general_purpose::STANDARD
                    .decode(key_str.trim())
                    .map_err(|e| ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    })?;
                Some(bytes)
            }
            None => None,
        };

        let qbo = QboDefaults {
            authorization_endpoint: non_empty(&mut layered, "AUTHORIZATION_ENDPOINT")
                .unwrap_or_else(default_authorization_endpoint),
            token_endpoint: non_empty(&mut layered, "TOKEN_ENDPOINT")
                .unwrap_or_else(default_token_endpoint),
            redirect_uri: non_empty(&mut layered, "REDIRECT_URI")
                .unwrap_or_else(default_redirect_uri),
            api_base_url: non_empty(&mut layered, "API_BASE_URL")
                .unwrap_or_else(default_api_base_url),
            minor_version: non_empty(&mut layered, "MINOR_VERSION")
                .unwrap_or_else(default_minor_version),
            export_minor_version: non_empty(&mut layered, "EXPORT_MINOR_VERSION")
                .unwrap_or_else(default_export_minor_version),
            scope: non_empty(&mut layered, "SCOPE").unwrap_or_else(default_scope),
            http_timeout_seconds: layered
                .remove("HTTP_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_http_timeout_seconds),
        };

        let scheduler = SchedulerConfig {
            enabled: layered
                .remove("SCHEDULER_ENABLED")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            tick_seconds: layered
                .remove("SCHEDULER_TICK_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_scheduler_tick_seconds),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            operator_tokens,
            crypto_key,
            resolver_max_depth,
            qbo,
            scheduler,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("QBO_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered.remove(key).filter(|v| !v.trim().is_empty())
}
