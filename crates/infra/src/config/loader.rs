//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If `ROUTELINK_API_BASE_URL` is set, configuration comes from the
//!    environment (defaults fill the rest)
//! 2. Otherwise the first config file found by [`probe_config_paths`] is used
//! 3. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `ROUTELINK_API_BASE_URL`: Base URL requests are resolved against
//! - `ROUTELINK_REFRESH_PATH`: Refresh endpoint path or absolute URL
//! - `ROUTELINK_TIMEOUT_MS`: Per-attempt timeout in milliseconds
//! - `ROUTELINK_RETRY_ATTEMPTS`: Retries after the first attempt
//! - `ROUTELINK_CACHE_TTL_MS`: Default GET cache lifetime in milliseconds
//! - `ROUTELINK_CACHE_ENABLED`: Whether GETs are cached (true/false)
//! - `ROUTELINK_PROACTIVE_WINDOW_SECS`: Refresh when less than this remains
//!
//! ## File Locations
//! The loader probes `routelink.toml` then `routelink.json` in the current
//! working directory, its two parent directories, and next to the
//! executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use routelink_common::{ClientConfig, ConfigError};

const BASE_URL_VAR: &str = "ROUTELINK_API_BASE_URL";

const CONFIG_FILE_NAMES: [&str; 2] = ["routelink.toml", "routelink.json"];

/// Load configuration with automatic fallback strategy
///
/// Uses the environment when the base URL variable is set, otherwise falls
/// back to a config file. Invalid values are reported, not skipped.
///
/// # Errors
/// Returns [`ConfigError`] if:
/// - An environment value cannot be parsed
/// - No config file is found or it cannot be parsed
/// - The resulting configuration fails validation
pub fn load() -> Result<ClientConfig, ConfigError> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(ConfigError::MissingVar(var)) => {
            tracing::debug!(%var, "environment incomplete, trying config file");
            load_from_file(None)
        }
        Err(e) => Err(e),
    }
}

/// Load configuration from process environment variables
///
/// # Errors
/// See [`load_from_vars`].
pub fn load_from_env() -> Result<ClientConfig, ConfigError> {
    load_from_vars(|key| std::env::var(key).ok())
}

/// Load configuration from an arbitrary variable source
///
/// `lookup` returns the value of a variable, or `None` if it is unset.
///
/// # Errors
/// Returns [`ConfigError::MissingVar`] if the base URL is unset, and
/// [`ConfigError::InvalidValue`] for unparsable values.
pub fn load_from_vars<F>(lookup: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = lookup(BASE_URL_VAR)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(BASE_URL_VAR.to_string()))?;
    let mut config = ClientConfig::new(base_url);

    if let Some(path) = lookup("ROUTELINK_REFRESH_PATH") {
        config.refresh_path = path;
    }
    if let Some(ms) = parse_var::<u64>(&lookup, "ROUTELINK_TIMEOUT_MS")? {
        config.timeout = Duration::from_millis(ms);
    }
    if let Some(attempts) = parse_var::<u32>(&lookup, "ROUTELINK_RETRY_ATTEMPTS")? {
        config.retry_attempts = attempts;
    }
    if let Some(ms) = parse_var::<u64>(&lookup, "ROUTELINK_CACHE_TTL_MS")? {
        config.cache_ttl = Duration::from_millis(ms);
    }
    config.enable_cache = env_bool(&lookup, "ROUTELINK_CACHE_ENABLED", config.enable_cache);
    if let Some(secs) = parse_var::<u64>(&lookup, "ROUTELINK_PROACTIVE_WINDOW_SECS")? {
        config.proactive_window = Duration::from_secs(secs);
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected
/// by file extension.
///
/// # Errors
/// Returns [`ConfigError`] if:
/// - No config file is found (when `path` is `None`)
/// - The file cannot be read
/// - The contents do not parse or fail validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let config_path = match path {
        Some(p) => p,
        None => probe_config_paths()
            .ok_or_else(|| ConfigError::NotFound { searched: candidate_paths().len() })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|source| ConfigError::Io { path: config_path.clone(), source })?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig, ConfigError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let parse_error =
        |message: String| ConfigError::Parse { path: path.to_path_buf(), message };

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| parse_error(format!("invalid TOML: {e}"))),
        "json" => {
            serde_json::from_str(contents).map_err(|e| parse_error(format!("invalid JSON: {e}")))
        }
        other => Err(parse_error(format!("unsupported config format: {other}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    candidate_paths().into_iter().find(|path| path.is_file())
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }

    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .collect()
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Parse boolean from a variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
