use std::path::Path;

use crate::config::schema::{Config, DispatchBackend};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

impl Config {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Config, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Applies `MONEYMATE_*` (and `REDIS_URL`) overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("MONEYMATE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("MONEYMATE_PORT") {
            self.server.port = parse_env("MONEYMATE_PORT", &port)?;
        }
        if let Some(url) = get("MONEYMATE_PUBLIC_URL") {
            self.server.public_url = url;
        }
        if let Some(path) = get("MONEYMATE_DB_PATH") {
            self.database.path = Some(path);
        }
        if let Some(dir) = get("MONEYMATE_UPLOAD_DIR") {
            self.uploads.directory = dir;
        }
        if let Some(max) = get("MONEYMATE_MAX_UPLOAD_BYTES") {
            self.uploads.max_bytes = parse_env("MONEYMATE_MAX_UPLOAD_BYTES", &max)?;
        }
        if let Some(backend) = get("MONEYMATE_DISPATCH_BACKEND") {
            self.dispatch.backend = match backend.trim().to_ascii_lowercase().as_str() {
                "redis" => DispatchBackend::Redis,
                "broadcast" => DispatchBackend::Broadcast,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        name: "MONEYMATE_DISPATCH_BACKEND".to_string(),
                        reason: format!("expected 'redis' or 'broadcast', got '{}'", other),
                    })
                }
            };
        }
        if let Some(url) = get("REDIS_URL") {
            self.dispatch.redis_url = url;
        }
        if let Some(channel) = get("MONEYMATE_CHANNEL") {
            self.dispatch.channel = channel;
        }
        if let Some(format) = get("MONEYMATE_LOG_FORMAT") {
            self.logging.format = format.parse().map_err(|reason| ConfigError::InvalidEnv {
                name: "MONEYMATE_LOG_FORMAT".to_string(),
                reason,
            })?;
        }

        Ok(())
    }
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks the rules the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::Validation {
        message: message.to_string(),
    };

    if config.server.port == 0 {
        return Err(invalid("server.port must be non-zero"));
    }
    let public_url = config.server.public_url.as_str();
    if !(public_url.starts_with("http://") || public_url.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("server.publicUrl must be an http(s) URL, got '{}'", public_url),
        });
    }
    if config.uploads.directory.trim().is_empty() {
        return Err(invalid("uploads.directory must not be empty"));
    }
    if config.uploads.max_bytes == 0 {
        return Err(invalid("uploads.maxBytes must be non-zero"));
    }
    if config.uploads.allowed_types.is_empty() {
        return Err(invalid("uploads.allowedTypes must list at least one type"));
    }
    config.uploads.policy()?;

    if config.dispatch.channel.trim().is_empty() {
        return Err(invalid("dispatch.channel must not be empty"));
    }
    match config.dispatch.backend {
        DispatchBackend::Redis if config.dispatch.redis_url.trim().is_empty() => {
            return Err(invalid("dispatch.redisUrl is required for the redis backend"));
        }
        DispatchBackend::Broadcast if config.dispatch.broadcast_capacity == 0 => {
            return Err(invalid("dispatch.broadcastCapacity must be non-zero"));
        }
        _ => {}
    }

    Ok(())
}
