//! Configuration module for sqlbridge.
//!
//! Handles the optional `sqlbridge.toml` settings file, environment
//! variable expansion and worker binary resolution.

mod settings;

pub use settings::{expand_env_vars, Settings, SettingsError, WorkerSettings};
