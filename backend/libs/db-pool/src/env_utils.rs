//! Environment variable parsing utilities
//!
//! Unlike a plain `.ok().and_then(parse)` chain, a value that is present but
//! malformed is reported instead of being silently replaced by the default.

use std::str::FromStr;

/// Parse an environment variable, falling back to `default` when it is unset.
///
/// Returns an error when the variable is set but cannot be parsed.
///
/// # Example
/// ```ignore
/// let workers: usize = parse_env_or("APP_WORKER_COUNT", 4)?;
/// ```
pub fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

/// Read a string variable with a default.
pub fn env_string_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Split a comma separated variable into trimmed, non-empty items.
///
/// `"a:9092, b:9092,"` becomes `["a:9092", "b:9092"]`.
pub fn parse_env_list(key: &str, default: &str) -> Vec<String> {
    env_string_or(key, default)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
