use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dispatch::DEFAULT_CHANNEL;
use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::secrets::SecretSource;
use crate::upload::{ImageKind, UploadPolicy, DEFAULT_MAX_BYTES};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL the OCR worker uses to reach this service.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Defaults to `~/.moneymate/data/moneymate.db`.
    #[serde(default)]
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Result<PathBuf, ConfigError> {
        match self.path.as_deref() {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => crate::db::default_database_path().ok_or_else(|| ConfigError::Validation {
                message: "database.path is not set and no home directory was found".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadsConfig {
    #[serde(default = "default_upload_directory")]
    pub directory: String,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

fn default_upload_directory() -> String {
    "uploads".to_string()
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

fn default_allowed_types() -> Vec<String> {
    ImageKind::ALL
        .iter()
        .map(|k| k.mime_type().to_string())
        .collect()
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            directory: default_upload_directory(),
            max_bytes: default_max_bytes(),
            allowed_types: default_allowed_types(),
        }
    }
}

impl UploadsConfig {
    pub fn policy(&self) -> Result<UploadPolicy, ConfigError> {
        let allowed = self
            .allowed_types
            .iter()
            .map(|mime| {
                ImageKind::from_mime(mime).ok_or_else(|| ConfigError::Validation {
                    message: format!("uploads.allowedTypes: unsupported type '{}'", mime),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UploadPolicy {
            max_bytes: self.max_bytes,
            allowed,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchBackend {
    #[default]
    Redis,
    /// In-process channel; only useful when the worker runs in the same process.
    Broadcast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    #[serde(default)]
    pub backend: DispatchBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_broadcast_capacity() -> usize {
    256
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend: DispatchBackend::default(),
            redis_url: default_redis_url(),
            channel: default_channel(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub jwt_secret_file: Option<String>,
    #[serde(default = "default_jwt_secret_env_var")]
    pub jwt_secret_env_var: Option<String>,

    /// Shared secret the OCR worker sends in `X-Callback-Secret`.
    #[serde(default)]
    pub callback_secret: Option<String>,
    #[serde(default)]
    pub callback_secret_file: Option<String>,
    #[serde(default)]
    pub callback_secret_env_var: Option<String>,
}

fn default_jwt_secret_env_var() -> Option<String> {
    Some("JWT_SECRET".to_string())
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_secret_file: None,
            jwt_secret_env_var: default_jwt_secret_env_var(),
            callback_secret: None,
            callback_secret_file: None,
            callback_secret_env_var: None,
        }
    }
}

impl AuthConfig {
    pub fn jwt_source(&self) -> SecretSource<'_> {
        SecretSource {
            direct: self.jwt_secret.as_deref(),
            file: self.jwt_secret_file.as_deref(),
            env_var: self.jwt_secret_env_var.as_deref(),
        }
    }

    pub fn callback_source(&self) -> SecretSource<'_> {
        SecretSource {
            direct: self.callback_secret.as_deref(),
            file: self.callback_secret_file.as_deref(),
            env_var: self.callback_secret_env_var.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}
