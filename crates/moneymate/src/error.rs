use std::path::PathBuf;
use thiserror::Error;

use crate::slip::SlipStatus;

#[derive(Error, Debug)]
pub enum MoneymateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Upload rejected: {0}")]
    Upload(#[from] UploadError),

    #[error("Slip error: {0}")]
    Slip(#[from] SlipError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value for environment variable '{name}': {reason}")]
    InvalidEnv { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not allocate a unique file name in '{0}'")]
    NameExhausted(PathBuf),

    #[error("Stored filename '{0}' is not a plain file name")]
    InvalidName(String),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to encode job message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to connect to job channel: {0}")]
    Connect(String),

    #[error("Failed to publish to channel '{channel}': {reason}")]
    Publish { channel: String, reason: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UploadError {
    #[error("No file uploaded")]
    Empty,

    #[error("File size exceeds the {limit_mb}MB limit")]
    TooLarge { size: usize, limit_mb: usize },

    #[error("Only jpg, png, and webp images are allowed")]
    UnsupportedType(String),

    #[error("File content does not match declared type '{declared}'")]
    ContentMismatch { declared: String },
}

#[derive(Error, Debug)]
pub enum SlipError {
    #[error("Slip not found")]
    NotFound,

    #[error("You do not have permission to access this slip")]
    Forbidden,

    #[error("Slip is not yet completed. Current status: {status}")]
    NotCompleted { status: SlipStatus },

    #[error("Slip cannot be re-queued (status: {status})")]
    NotRequeueable { status: SlipStatus },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Upload(#[from] UploadError),
}

pub type Result<T> = std::result::Result<T, MoneymateError>;
