// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and environment overrides for the
//! runbook server.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed.
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory-level configuration issues that do not prevent startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// No bearer token was configured; the API is reachable by anyone who
    /// can reach the bound address.
    NoAuthToken,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            Self::NoAuthToken => write!(f, "no auth token configured; API is unauthenticated"),
        }
    }
}

/// Top-level runtime configuration for the runbook server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RunbookConfig {
    /// Address the HTTP server binds to, e.g. `"127.0.0.1:4173"`.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Root directory the file service, template renderer, and registry
    /// operate within. Relative paths are resolved against the process's
    /// current working directory.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    /// Seconds to wait after SIGTERM before escalating to SIGKILL when
    /// cancelling a running execution.
    #[serde(default = "default_pty_grace_period_secs")]
    pub pty_grace_period_secs: u64,

    /// Maximum size, in bytes, of a file whose content is inlined into a
    /// file-tree response. Larger files are listed without content.
    #[serde(default = "default_max_inline_file_bytes")]
    pub max_inline_file_bytes: u64,

    /// Bearer token required on every `/api/*` request. `None` disables
    /// authentication, which is appropriate only for loopback-only use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for RunbookConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            workspace_dir: default_workspace_dir(),
            pty_grace_period_secs: default_pty_grace_period_secs(),
            max_inline_file_bytes: default_max_inline_file_bytes(),
            auth_token: None,
            log_level: None,
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:4173".to_string()
}

fn default_workspace_dir() -> String {
    ".".to_string()
}

fn default_pty_grace_period_secs() -> u64 {
    5
}

fn default_max_inline_file_bytes() -> u64 {
    256 * 1024
}

const MAX_GRACE_PERIOD_SECS: u64 = 300;
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Load a [`RunbookConfig`] from an optional TOML file path, then apply
/// environment overrides.
///
/// * If `path` is `Some`, reads and parses the file, failing if it is
///   missing or malformed.
/// * If `path` is `None`, starts from [`RunbookConfig::default`].
pub fn load_config(path: Option<&Path>) -> Result<RunbookConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => RunbookConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`RunbookConfig`].
pub fn parse_toml(content: &str) -> Result<RunbookConfig, ConfigError> {
    toml::from_str::<RunbookConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply environment variable overrides.
///
/// Recognised variables: `RUNBOOK_BIND_ADDR`, `RUNBOOK_WORKSPACE_DIR`,
/// `RUNBOOK_AUTH_TOKEN`, `RUNBOOK_LOG_LEVEL`.
pub fn apply_env_overrides(config: &mut RunbookConfig) {
    if let Ok(val) = std::env::var("RUNBOOK_BIND_ADDR") {
        config.bind_addr = val;
    }
    if let Ok(val) = std::env::var("RUNBOOK_WORKSPACE_DIR") {
        config.workspace_dir = val;
    }
    if let Ok(val) = std::env::var("RUNBOOK_AUTH_TOKEN") {
        config.auth_token = Some(val);
    }
    if let Ok(val) = std::env::var("RUNBOOK_LOG_LEVEL") {
        config.log_level = Some(val);
    }
}

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (zero-length workspace dir, out-of-range grace period,
/// unrecognised log level) come back as [`ConfigError::ValidationError`];
/// soft issues come back as warnings.
pub fn validate_config(config: &RunbookConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.workspace_dir.trim().is_empty() {
        errors.push("workspace_dir must not be empty".to_string());
    }

    if config.pty_grace_period_secs == 0 || config.pty_grace_period_secs > MAX_GRACE_PERIOD_SECS {
        errors.push(format!(
            "pty_grace_period_secs must be in 1..={MAX_GRACE_PERIOD_SECS}, got {}",
            config.pty_grace_period_secs
        ));
    }

    if config.max_inline_file_bytes == 0 {
        errors.push("max_inline_file_bytes must be greater than zero".to_string());
    }

    if let Some(ref level) = config.log_level {
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!("invalid log_level '{level}'"));
        }
    }

    if config.auth_token.is_none() {
        warnings.push(ConfigWarning::NoAuthToken);
    }

    if !errors.is_empty() {
        return Err(ConfigError::ValidationError { reasons: errors });
    }

    Ok(warnings)
}
