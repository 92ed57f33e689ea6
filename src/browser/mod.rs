//! Browser cookie extraction module
//!
//! Reads the on-disk cookie jars of installed browsers. Databases are copied
//! to a temp dir first because a running browser keeps them locked.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::TempDir;

use crate::config::{Browser, BrowserCookieConfig};
use crate::error::{Result, SyncError};
use crate::harvest::CookieSource;

pub mod chromium;
pub mod firefox;

/// Represents a browser cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Unix seconds; `None` for session cookies
    pub expires: Option<i64>,
}

impl Cookie {
    pub fn new(name: &str, value: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires, Some(expires) if expires <= now)
    }
}

/// Cookie-jar domain matching: leading dots are ignored on both sides and a
/// cookie matches its own host or any subdomain of the filter.
pub fn domain_matches(cookie_domain: &str, filter: &str) -> bool {
    let host = cookie_domain.trim_start_matches('.').to_ascii_lowercase();
    let filter = filter.trim_start_matches('.').to_ascii_lowercase();
    if filter.is_empty() {
        return false;
    }
    host == filter || host.ends_with(&format!(".{}", filter))
}

/// Reads every cookie from the configured browser's jar
pub struct BrowserCookieExtractor {
    config: BrowserCookieConfig,
}

impl BrowserCookieExtractor {
    /// Create a new cookie extractor with the given configuration
    pub fn new(config: BrowserCookieConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrowserCookieConfig {
        &self.config
    }

    /// All unexpired cookies in jar order
    pub fn extract_cookies(&self) -> Result<Vec<Cookie>> {
        let cookies = match self.config.browser {
            Browser::Firefox => firefox::extract_cookies(&self.config)?,
            Browser::Chrome => {
                chromium::extract_cookies(chromium::ChromiumBrowser::Chrome, &self.config)?
            }
            Browser::Chromium => {
                chromium::extract_cookies(chromium::ChromiumBrowser::Chromium, &self.config)?
            }
            Browser::Edge => chromium::extract_cookies(chromium::ChromiumBrowser::Edge, &self.config)?,
            Browser::Brave => {
                chromium::extract_cookies(chromium::ChromiumBrowser::Brave, &self.config)?
            }
            Browser::Opera => {
                chromium::extract_cookies(chromium::ChromiumBrowser::Opera, &self.config)?
            }
            Browser::Vivaldi => {
                chromium::extract_cookies(chromium::ChromiumBrowser::Vivaldi, &self.config)?
            }
        };
        let now = chrono::Utc::now().timestamp();
        Ok(cookies
            .into_iter()
            .filter(|cookie| !cookie.is_expired(now))
            .collect())
    }
}

impl CookieSource for BrowserCookieExtractor {
    async fn get_all(&self, domain: &str) -> Result<Vec<Cookie>> {
        let jar = self.read_jar().await?;
        Ok(cookies_for(&jar, domain))
    }

    /// One copy of the database and one keyring lookup for every domain.
    async fn get_for_domains(&self, domains: &[&str]) -> Result<Vec<Vec<Cookie>>> {
        let jar = self.read_jar().await?;
        Ok(domains
            .iter()
            .map(|domain| cookies_for(&jar, domain))
            .collect())
    }
}

impl BrowserCookieExtractor {
    /// Reads the jar on the blocking pool; SQLite and the keyring block.
    async fn read_jar(&self) -> Result<Vec<Cookie>> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || BrowserCookieExtractor::new(config).extract_cookies())
            .await
            .map_err(|e| SyncError::BrowserCookie(format!("Cookie reader stopped: {}", e)))?
    }
}

fn cookies_for(jar: &[Cookie], domain: &str) -> Vec<Cookie> {
    jar.iter()
        .filter(|cookie| domain_matches(&cookie.domain, domain))
        .cloned()
        .collect()
}

/// Copy of a cookie database, opened read-only from a private temp dir.
pub(crate) struct DatabaseCopy {
    _dir: TempDir,
    pub conn: Connection,
}

pub(crate) fn open_database_copy(source: &Path, label: &str) -> Result<DatabaseCopy> {
    let dir = tempfile::tempdir()
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to create temp dir: {}", e)))?;
    let target = dir.path().join(format!("{}-cookies.sqlite", label));
    fs::copy(source, &target).map_err(|e| {
        SyncError::BrowserCookie(format!("Failed to copy cookies DB {:?}: {}", source, e))
    })?;
    let conn = Connection::open(&target)
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to open cookies DB: {}", e)))?;
    Ok(DatabaseCopy { _dir: dir, conn })
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to read cookie schema: {}", e)))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to read cookie schema: {}", e)))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to read cookie schema: {}", e)))
}

/// Profile argument that names a path rather than a profile directory name
pub(crate) fn is_path_like(value: &str) -> bool {
    value.contains('/') || value.contains('\\') || value.starts_with('~')
}

/// `profile` below `base`, or `base` itself
pub(crate) fn profile_root(base: &Path, profile: Option<&str>) -> PathBuf {
    match profile {
        Some(profile) => base.join(profile),
        None => base.to_path_buf(),
    }
}

/// Newest file called `filename` at or below `root`
pub(crate) fn find_newest(root: &Path, filename: &str) -> Option<PathBuf> {
    if root.is_file() {
        return Some(root.to_path_buf());
    }
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.file_name().and_then(|name| name.to_str()) != Some(filename) {
                continue;
            }
            let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if newest.as_ref().map_or(true, |(best, _)| modified > *best) {
                newest = Some((modified, path));
            }
        }
    }
    newest.map(|(_, path)| path)
}
