//! TOML-based configuration.
//!
//! Supports a config file (sqlbridge.toml) with environment variable
//! expansion.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! path = "${SQLBRIDGE_WORKER}"
//!
//! [connection]
//! expandPlaceholders = true
//! stringifyFetches = false
//! timeoutSeconds = 5
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::protocol::ConnectionOptions;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Worker binary not found. Set worker.path in sqlbridge.toml")]
    WorkerNotFound,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker process configuration.
    pub worker: WorkerSettings,

    /// Default connection options for clients built from these settings.
    pub connection: ConnectionOptions,
}

/// Worker configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to the worker binary (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl Settings {
    /// Load settings from an explicit path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        let expanded = expand_env_vars(&raw)?;
        Ok(toml::from_str(&expanded)?)
    }

    /// Load `sqlbridge.toml` from the current directory or the user config
    /// directory, falling back to defaults when neither exists.
    pub fn discover() -> Result<Self, SettingsError> {
        let local = PathBuf::from("sqlbridge.toml");
        if local.exists() {
            return Self::load(local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let global = config_dir.join("sqlbridge").join("sqlbridge.toml");
            if global.exists() {
                return Self::load(global);
            }
        }
        Ok(Self::default())
    }

    /// Default connection options derived from these settings.
    pub fn connection_options(&self) -> ConnectionOptions {
        self.connection.clone()
    }

    /// Resolve the worker binary path.
    ///
    /// Uses the configured path when present, then searches conventional
    /// locations relative to the working directory.
    pub fn resolve_worker_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.worker.path {
            return Ok(PathBuf::from(expand_env_vars(path)?));
        }

        let candidates = [
            "sqlbridge-worker",
            "./sqlbridge-worker",
            "./target/release/sqlbridge-worker",
            "./target/debug/sqlbridge-worker",
        ];

        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(path);
            }
        }

        Err(SettingsError::WorkerNotFound)
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(chars.next().unwrap());
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                // $VAR (ends at non-alphanumeric/underscore)
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(chars.next().unwrap());
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
