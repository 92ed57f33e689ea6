//! Firefox browser cookie extraction

use std::path::PathBuf;

use rusqlite::Row;

use crate::browser::{
    find_newest, is_path_like, open_database_copy, profile_root, table_columns, Cookie,
};
use crate::config::BrowserCookieConfig;
use crate::error::{Result, SyncError};
use crate::utils::FileUtils;

const MAX_SUPPORTED_DB_SCHEMA_VERSION: i64 = 17;
const COOKIE_DB: &str = "cookies.sqlite";

pub fn extract_cookies(config: &BrowserCookieConfig) -> Result<Vec<Cookie>> {
    let cookie_db = firefox_search_roots(config.profile.as_deref())?
        .iter()
        .filter(|root| root.exists())
        .filter_map(|root| find_newest(root, COOKIE_DB))
        .next()
        .ok_or_else(|| SyncError::FileNotFound("Firefox cookies database not found".to_string()))?;
    log::debug!("reading Firefox cookies from {:?}", cookie_db);

    let copy = open_database_copy(&cookie_db, "firefox")?;
    let conn = &copy.conn;
    let schema_version: i64 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap_or(0);
    if schema_version > MAX_SUPPORTED_DB_SCHEMA_VERSION {
        log::warn!(
            "Firefox cookie DB schema version {} may be unsupported",
            schema_version
        );
    }

    let columns = table_columns(conn, "moz_cookies")?;
    let has = |name: &str| columns.iter().any(|c| c == name);
    let expiry_column = if has("expiry") {
        "expiry"
    } else if has("expires") {
        "expires"
    } else {
        return Err(SyncError::BrowserCookie(
            "Firefox cookies table missing expiry column".to_string(),
        ));
    };
    let secure_column = if has("is_secure") { "is_secure" } else { "isSecure" };
    let http_only_column = if has("isHttpOnly") {
        "isHttpOnly"
    } else if has("is_http_only") {
        "is_http_only"
    } else {
        "0"
    };

    let query = format!(
        "SELECT host, name, value, path, {}, {}, {} FROM moz_cookies",
        expiry_column, secure_column, http_only_column
    );
    let mut stmt = conn
        .prepare(&query)
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to prepare Firefox query: {}", e)))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to query Firefox cookies: {}", e)))?;

    let mut cookies = Vec::new();
    while let Some(row) = rows.next().map_err(|e| {
        SyncError::BrowserCookie(format!("Failed to read Firefox cookie row: {}", e))
    })? {
        cookies.push(row_to_cookie(row, schema_version).map_err(|e| {
            SyncError::BrowserCookie(format!("Malformed Firefox cookie row: {}", e))
        })?);
    }
    Ok(cookies)
}

fn firefox_search_roots(profile: Option<&str>) -> Result<Vec<PathBuf>> {
    if let Some(path) = profile.filter(|p| is_path_like(p)) {
        return Ok(vec![FileUtils::expand_path(path)?]);
    }
    let bases = default_profile_dirs();
    if bases.is_empty() {
        return Err(SyncError::Config(
            "Cannot determine Firefox profile directory".to_string(),
        ));
    }
    Ok(bases
        .iter()
        .map(|base| profile_root(base, profile))
        .collect())
}

#[cfg(target_os = "macos")]
fn default_profile_dirs() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| vec![home.join("Library/Application Support/Firefox/Profiles")])
        .unwrap_or_default()
}

#[cfg(target_os = "windows")]
fn default_profile_dirs() -> Vec<PathBuf> {
    dirs::config_dir()
        .map(|appdata| vec![appdata.join("Mozilla/Firefox/Profiles")])
        .unwrap_or_default()
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn default_profile_dirs() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| {
            vec![
                home.join(".mozilla/firefox"),
                home.join("snap/firefox/common/.mozilla/firefox"),
                home.join(".var/app/org.mozilla.firefox/.mozilla/firefox"),
            ]
        })
        .unwrap_or_default()
}

fn row_to_cookie(row: &Row<'_>, schema_version: i64) -> rusqlite::Result<Cookie> {
    let expiry: Option<i64> = row.get(4)?;
    let secure: i64 = row.get(5)?;
    let http_only: i64 = row.get(6)?;

    Ok(Cookie {
        domain: row.get(0)?,
        name: row.get(1)?,
        value: row.get(2)?,
        path: row.get(3)?,
        secure: secure != 0,
        http_only: http_only != 0,
        expires: firefox_expiry_seconds(expiry, schema_version),
    })
}

/// Schema 16 switched `expiry` to milliseconds.
fn firefox_expiry_seconds(expiry: Option<i64>, schema_version: i64) -> Option<i64> {
    let seconds = match expiry? {
        ms if schema_version >= 16 => ms / 1000,
        seconds => seconds,
    };
    (seconds > 0).then_some(seconds)
}
