//! Utility functions and helpers

use crate::config::MAX_INTERVAL;
use crate::error::{Result, SyncError};
use std::path::PathBuf;
use url::Url;

/// URL validation and parsing utilities
pub struct UrlUtils;

impl UrlUtils {
    /// Validate and normalize URL
    pub fn validate_url(input: &str) -> Result<Url> {
        // Add https:// if no scheme is provided
        let url_str = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };

        let url = Url::parse(&url_str)
            .map_err(|e| SyncError::InvalidUrl(format!("Invalid URL '{}': {}", input, e)))?;
        if url.host_str().is_none() {
            return Err(SyncError::InvalidUrl(format!("URL '{}' has no host", input)));
        }
        Ok(url)
    }

    /// Append an endpoint path to a base URL that may itself carry a path
    /// prefix (`https://host/api` + `/auth/login`).
    pub fn join(base: &str, path: &str) -> Result<Url> {
        let base = base.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Self::validate_url(&format!("{}/{}", base, path))
    }
}

/// File system utilities
pub struct FileUtils;

impl FileUtils {
    /// Expand tilde (~) in file paths
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if path == "~" || path.starts_with("~/") || path.starts_with("~\\") {
            let home_dir = dirs::home_dir()
                .ok_or_else(|| SyncError::Config("Cannot determine home directory".to_string()))?;
            Ok(home_dir.join(path[1..].trim_start_matches(['/', '\\'])))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

/// String utilities
pub struct StringUtils;

impl StringUtils {
    /// Parse interval values (plain minutes, or with an `s`/`m`/`h` suffix)
    pub fn parse_interval(input: &str) -> Result<std::time::Duration> {
        let (number_part, unit) = if input.bytes().all(|b| b.is_ascii_digit()) {
            (input, 60)
        } else if let Some(stripped) = input.strip_suffix('s') {
            (stripped, 1)
        } else if let Some(stripped) = input.strip_suffix('m') {
            (stripped, 60)
        } else if let Some(stripped) = input.strip_suffix('h') {
            (stripped, 3600)
        } else {
            return Err(SyncError::Config(format!(
                "Invalid interval format: '{}'. Use minutes or a number with s/m/h",
                input
            )));
        };

        let number: u64 = number_part
            .parse()
            .map_err(|_| SyncError::Config(format!("Invalid interval number: '{}'", number_part)))?;
        if number == 0 {
            return Err(SyncError::Config("Interval must be positive".to_string()));
        }

        let interval = number
            .checked_mul(unit)
            .map(std::time::Duration::from_secs)
            .filter(|interval| *interval <= MAX_INTERVAL)
            .ok_or_else(|| {
                SyncError::Config(format!("Interval '{}' is longer than one year", input))
            })?;
        Ok(interval)
    }
}
