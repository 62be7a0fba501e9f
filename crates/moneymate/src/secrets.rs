//! Secret resolution for the JWT signing key and the worker callback secret.
//!
//! Each secret may be configured three ways, tried in this order:
//!
//! 1. inline value (`jwtSecret`), handy for local runs
//! 2. file (`jwtSecretFile`), for mounted container secrets
//! 3. environment variable name (`jwtSecretEnvVar`)
//!
//! Empty strings count as "not configured".

use std::path::PathBuf;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source configured (inline value, file or env var)")]
    NoSourceProvided,

    #[error("Failed to read secret file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{path}' is empty")]
    EmptyFile { path: PathBuf },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// The three places a secret may come from. Borrowed from config.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretSource<'a> {
    pub direct: Option<&'a str>,
    pub file: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl SecretSource<'_> {
    pub fn is_configured(&self) -> bool {
        has_secret_source(self.direct, self.file, self.env_var)
    }

    pub fn resolve(&self) -> Result<SecretString, SecretError> {
        resolve_secret(self.direct, self.file, self.env_var)
    }

    pub fn resolve_optional(&self) -> Result<Option<SecretString>, SecretError> {
        resolve_secret_optional(self.direct, self.file, self.env_var)
    }
}

/// Resolves a secret from the first configured source.
///
/// File and env values are trimmed; a configured file or env var that
/// cannot be read is an error rather than falling through to the next
/// source.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString, SecretError> {
    if let Some(value) = configured(direct) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = configured(file_path) {
        let path = expand_home(path);
        let content = std::fs::read_to_string(&path).map_err(|e| SecretError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SecretError::EmptyFile { path });
        }
        return Ok(SecretString::from(trimmed.to_string()));
    }

    if let Some(name) = configured(env_var) {
        return match std::env::var(name) {
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but an unconfigured secret is `Ok(None)`.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>, SecretError> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    [direct, file_path, env_var]
        .into_iter()
        .any(|s| configured(s).is_some())
}

fn configured(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Expands a leading `~` or `~/`. `~user` is left alone.
fn expand_home(path: &str) -> PathBuf {
    let rest = match path {
        "~" => Some(""),
        _ => path.strip_prefix("~/"),
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
