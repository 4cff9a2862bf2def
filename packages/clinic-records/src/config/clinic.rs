use super::{
    DatabaseConfig, LogConfig, RateLimitConfig, ServerConfig, StorageConfig, CLINIC_PREFIX,
    DEFAULT_CONFIG_FILE_PATH, ENCRYPTION_KEY_LENGTH,
};
use crate::config::LogFormat;
use crate::error::{ConfigError, Error};
use crate::Args;
use config::{Config, Environment};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct ClinicConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub encrypt: EncryptConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,

    #[serde(default = "AuthConfig::default_access_token_ttl")]
    pub access_token_ttl: u64,

    #[serde(default = "AuthConfig::default_refresh_token_ttl")]
    pub refresh_token_ttl: u64,

    #[serde(default = "AuthConfig::default_password_hash_iterations")]
    pub password_hash_iterations: u32,
}

#[derive(Clone, Deserialize)]
pub struct EncryptConfig {
    pub key: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "PrometheusConfig::default_port")]
    pub port: u16,
}

/// Config defaults to a file called `clinic-records.toml` in the current directory.
/// Supports TOML and JSON.
/// Variable names should match the struct field names.
///
/// ENV vars can be used to override file settings.
///
/// ENV vars must be prefixed with `CLINIC_`, nested values use `__`,
/// for example `CLINIC_AUTH__ACCESS_TOKEN_SECRET`.
///
impl ClinicConfig {
    pub fn default_path() -> String {
        DEFAULT_CONFIG_FILE_PATH.to_string()
    }

    pub fn load(args: &Args) -> Result<ClinicConfig, Error> {
        // Log a warning to user that config file is missing
        if !PathBuf::from(&args.config_file_path).exists() {
            println!(
                "Configuration file was not found: {}",
                args.config_file_path
            );
            println!("Loading config values from environment variables.");
        }
        let mut config = ClinicConfig::build(&args.config_file_path)?;

        // If log level is default, it has not been set by the user in config
        if config.log.level == LogConfig::default_log_level() {
            config.log.level = args.log_level;
        }

        // If log format is default, it has not been set by the user in config
        if config.log.format == LogConfig::default_log_format() {
            config.log.format = args.log_format;
        }

        Ok(config)
    }

    pub fn build(path: &str) -> Result<Self, Error> {
        // For parsing top-level values such as CLINIC_HOST
        // and for parsing nested env values such as CLINIC_SERVER__PORT, CLINIC_ENCRYPT__KEY
        let env_source = Environment::with_prefix(CLINIC_PREFIX)
            .try_parsing(true)
            .separator("__")
            .prefix_separator("_");

        let config: Self = Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(env_source)
            .build()?
            .try_deserialize()
            .map_err(|err| match err {
                config::ConfigError::Message(ref s) => match s {
                    s if s.contains("missing field") => {
                        let name = extract_field_name(s).map_or("unknown".to_string(), |s| s);
                        ConfigError::MissingParameter {
                            name: qualified_field_name(&name),
                        }
                    }
                    s if s.contains("does not have variant constructor") => {
                        let (name, value) = extract_invalid_field(s);
                        ConfigError::InvalidParameter { name, value }
                    }
                    _ => err.into(),
                },
                _ => err.into(),
            })?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.password_hash_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "auth.password_hash_iterations".to_string(),
                value: "0".to_string(),
            });
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "rate_limit".to_string(),
                value: format!(
                    "max_requests={} window={}",
                    self.rate_limit.max_requests, self.rate_limit.window
                ),
            });
        }

        self.server.socket_address()?;

        Ok(())
    }

    pub fn use_structured_logging(&self) -> bool {
        matches!(self.log.format, LogFormat::Structured)
    }

    ///
    /// Returns true if Prometheus export is enabled
    ///
    pub fn prometheus_enabled(&self) -> bool {
        self.prometheus.enabled
    }

    ///
    /// Returns true if patient and user documents are kept in PostgreSQL
    ///
    pub fn database_enabled(&self) -> bool {
        self.database.is_some()
    }
}

impl AuthConfig {
    // 15 minutes
    pub const fn default_access_token_ttl() -> u64 {
        60 * 15
    }

    // 7 days
    pub const fn default_refresh_token_ttl() -> u64 {
        60 * 60 * 24 * 7
    }

    pub const fn default_password_hash_iterations() -> u32 {
        100_000
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl)
    }
}

// Secrets are never written to logs
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"<redacted>")
            .field("refresh_token_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("password_hash_iterations", &self.password_hash_iterations)
            .finish()
    }
}

impl EncryptConfig {
    ///
    /// The configured key as exactly ENCRYPTION_KEY_LENGTH bytes.
    /// Longer keys are truncated, shorter keys are padded with ASCII '0'.
    ///
    pub fn key_bytes(&self) -> [u8; ENCRYPTION_KEY_LENGTH] {
        let mut key = [b'0'; ENCRYPTION_KEY_LENGTH];
        let bytes = self.key.as_bytes();
        let len = bytes.len().min(ENCRYPTION_KEY_LENGTH);
        key[..len].copy_from_slice(&bytes[..len]);
        key
    }

    pub fn is_normalised(&self) -> bool {
        self.key.len() == ENCRYPTION_KEY_LENGTH
    }
}

impl std::fmt::Debug for EncryptConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptConfig")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl PrometheusConfig {
    pub fn default_port() -> u16 {
        9930
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        PrometheusConfig {
            enabled: false,
            port: PrometheusConfig::default_port(),
        }
    }
}

///
/// Extracts a field name (if present) from a config::ConfigError::Message
/// This is called in `build` if a ConfigError message contains the string `missing field`
///
fn extract_field_name(input: &str) -> Option<String> {
    let re = Regex::new(r"`(\w+)`").ok()?;
    re.captures(input)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

///
/// serde only reports the leaf name of a missing field.
/// Required fields are unique enough to map back to their section.
///
fn qualified_field_name(name: &str) -> String {
    match name {
        "access_token_secret" | "refresh_token_secret" => format!("auth.{name}"),
        "key" => "encrypt.key".to_string(),
        "name" | "username" | "password" => format!("database.{name}"),
        _ => name.to_string(),
    }
}

///
/// Extracts a field name (if present) from a config::ConfigError::Message
/// This is called in `build` if a ConfigError message contains the string `does not have variant constructor`
///
/// Error string is `enum {name} does not have variant constructor {value}`
///
fn extract_invalid_field(input: &str) -> (String, String) {
    let words = input.split(' ').collect::<Vec<_>>();

    let default_name = "unknown".to_string();
    let default_val = "".to_string();

    if !input.starts_with("enum") {
        return (default_name, default_val);
    }

    let name = words
        .get(1)
        .map_or(default_name.to_owned(), |w| w.to_string());

    let value = words
        .last()
        .map_or(default_val.to_owned(), |w| w.to_string());

    (name, value)
}
