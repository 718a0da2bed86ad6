use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Root directory for all durable data (sessions, rankings, papers).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(toml::from_str(&expanded)?)
    }
}

/// Resolve a path relative to the config file directory.
///
/// Absolute paths are returned as-is; relative paths are joined with the
/// config file's parent directory so behavior does not depend on the
/// current working directory.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

// ============================================================================
// Default Paths
// ============================================================================

/// Default data directory (relative to config file).
pub const DEFAULT_DATA_DIR: &str = ".inkling";
/// Sessions subdirectory (relative to data dir).
pub const SESSIONS_SUBDIR: &str = "sessions";
/// Rankings subdirectory (relative to data dir).
pub const RANKINGS_SUBDIR: &str = "rankings";
/// Papers catalog subdirectory (relative to data dir).
pub const PAPERS_SUBDIR: &str = "papers";
/// User facts subdirectory (relative to data dir).
pub const FACTS_SUBDIR: &str = "facts";

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_keep_alive_interval() -> u64 {
    10
}

fn default_max_connections() -> usize {
    64
}

fn default_history_limit() -> usize {
    100
}

fn default_history_ttl_hours() -> i64 {
    24
}

fn default_scoring_concurrency() -> usize {
    8
}

fn default_base_url() -> String {
    "http://localhost:4000/v1".to_string()
}

fn default_model_name() -> String {
    "papers_ranker".to_string()
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports shell-compatible syntax:
/// - `${VAR}` - required variable, errors if not set
/// - `${VAR:-default}` - optional variable with default value
/// - `$$` - escaped `$` (only needed before `{`)
///
/// No nested expansion; an unclosed `${` is an error.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let expanded = parse_var_reference(&mut chars)?;
                    result.push_str(&expanded);
                }
                _ => {
                    result.push('$');
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

/// Parse a variable reference after seeing `${`.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;
    let mut in_default = false;
    let mut found_closing_brace = false;

    while let Some(&c) = chars.peek() {
        match c {
            '}' => {
                chars.next();
                found_closing_brace = true;
                break;
            }
            ':' if !in_default => {
                chars.next();
                if chars.peek() == Some(&'-') {
                    chars.next();
                    in_default = true;
                    default_value = Some(String::new());
                } else {
                    var_name.push(':');
                }
            }
            _ => {
                chars.next();
                if in_default {
                    default_value.as_mut().expect("default buffer").push(c);
                } else {
                    var_name.push(c);
                }
            }
        }
    }

    if !found_closing_brace {
        return Err(ConfigError::UnclosedVarReference);
    }

    match std::env::var(&var_name) {
        Ok(value) => Ok(value),
        Err(_) => match default_value {
            Some(default) => Ok(default),
            None => Err(ConfigError::MissingEnvVar(var_name)),
        },
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
            max_connections: default_max_connections(),
        }
    }
}

// ============================================================================
// SessionConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Bound on stored history length, in messages.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// History TTL; refreshed on every append.
    #[serde(default = "default_history_ttl_hours")]
    pub history_ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            history_ttl_hours: default_history_ttl_hours(),
        }
    }
}

// ============================================================================
// RankingConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RankingConfig {
    /// Concurrent per-item scoring calls.
    #[serde(default = "default_scoring_concurrency")]
    pub scoring_concurrency: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            scoring_concurrency: default_scoring_concurrency(),
        }
    }
}

// ============================================================================
// ModelConfig
// ============================================================================

/// OpenAI-compatible endpoint for the model provider.
#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key; typically supplied as `${INKLING_API_KEY:-}` in the file.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model_name")]
    pub name: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            name: default_model_name(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
