//! config-rs/lib.rs
//! Shared configuration utilities for consistent service configuration
//! Provides the environment-variable parsing used by every `*Config::from_env`

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Interpret an environment variable as a boolean flag
///
/// # Arguments
/// * `name` - The variable name (e.g., "AIRE_MONITOR_ENABLED")
/// * `default` - Value used when the variable is unset or unrecognized
///
/// # Returns
/// `true` for "1", "true", "yes", "on"; `false` for "0", "false", "no", "off"
/// (case-insensitive)
pub fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                log::warn!("Invalid boolean '{}' in {}, using default {}", other, name, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse an environment variable into any `FromStr` type with fallback
///
/// # Arguments
/// * `name` - The variable name
/// * `default` - Value used when the variable is unset or fails to parse
pub fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value '{}' in {}, using default {}", raw, name, default);
            default
        }),
        Err(_) => default,
    }
}

/// Read a string variable, falling back to `default` when unset or blank
pub fn env_string(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

/// Read a string variable; unset and blank values are both `None`
pub fn env_optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a filesystem path variable with fallback
pub fn env_path(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(name, default))
}

/// Read a comma-separated list; empty items are dropped
///
/// # Returns
/// An empty vector when the variable is unset
pub fn env_list(name: &str) -> Vec<String> {
    env::var(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
