//! Chrome/Chromium browser cookie extraction
//!
//! Values are stored either in plain text or AES-128-CBC encrypted behind a
//! `v10`/`v11` prefix. The key is derived from a per-OS "Safe Storage"
//! password: a fixed string or the desktop keyring on Linux, the login
//! keychain on macOS. Windows DPAPI values are not supported; plain values
//! are still read there.

use std::path::PathBuf;

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use sha1::Sha1;

use crate::browser::{
    find_newest, is_path_like, open_database_copy, profile_root, table_columns, Cookie,
};
use crate::config::BrowserCookieConfig;
use crate::error::{Result, SyncError};
use crate::utils::FileUtils;

const KEY_DERIVE_SALT: &[u8] = b"saltysalt";
const KEY_LENGTH: usize = 16;
const AES_IV: &[u8; 16] = b"                ";
const COOKIE_DB: &str = "Cookies";
/// Seconds between 1601-01-01 and the Unix epoch
const WINDOWS_EPOCH_OFFSET: i64 = 11_644_473_600;

/// Supported Chromium-based browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromiumBrowser {
    Chrome,
    Chromium,
    Edge,
    Brave,
    Opera,
    Vivaldi,
}

impl ChromiumBrowser {
    /// Account/label used for the "<name> Safe Storage" secret
    #[cfg_attr(not(any(target_os = "linux", target_os = "macos")), allow(dead_code))]
    fn keyring_name(&self) -> &'static str {
        match self {
            ChromiumBrowser::Chrome | ChromiumBrowser::Vivaldi => "Chrome",
            ChromiumBrowser::Chromium | ChromiumBrowser::Opera => "Chromium",
            ChromiumBrowser::Edge => "Microsoft Edge",
            ChromiumBrowser::Brave => "Brave",
        }
    }

    #[cfg(target_os = "macos")]
    fn user_data_dir(&self) -> Option<PathBuf> {
        let relative = match self {
            ChromiumBrowser::Chrome => "Google/Chrome",
            ChromiumBrowser::Chromium => "Chromium",
            ChromiumBrowser::Edge => "Microsoft Edge",
            ChromiumBrowser::Brave => "BraveSoftware/Brave-Browser",
            ChromiumBrowser::Opera => "com.operasoftware.Opera",
            ChromiumBrowser::Vivaldi => "Vivaldi",
        };
        dirs::home_dir().map(|home| home.join("Library/Application Support").join(relative))
    }

    #[cfg(target_os = "windows")]
    fn user_data_dir(&self) -> Option<PathBuf> {
        let relative = match self {
            ChromiumBrowser::Chrome => "Google/Chrome/User Data",
            ChromiumBrowser::Chromium => "Chromium/User Data",
            ChromiumBrowser::Edge => "Microsoft/Edge/User Data",
            ChromiumBrowser::Brave => "BraveSoftware/Brave-Browser/User Data",
            ChromiumBrowser::Opera => "Opera Software/Opera Stable",
            ChromiumBrowser::Vivaldi => "Vivaldi/User Data",
        };
        dirs::data_local_dir().map(|dir| dir.join(relative))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn user_data_dir(&self) -> Option<PathBuf> {
        let relative = match self {
            ChromiumBrowser::Chrome => "google-chrome",
            ChromiumBrowser::Chromium => "chromium",
            ChromiumBrowser::Edge => "microsoft-edge",
            ChromiumBrowser::Brave => "BraveSoftware/Brave-Browser",
            ChromiumBrowser::Opera => "opera",
            ChromiumBrowser::Vivaldi => "vivaldi",
        };
        dirs::config_dir().map(|dir| dir.join(relative))
    }
}

pub fn extract_cookies(browser: ChromiumBrowser, config: &BrowserCookieConfig) -> Result<Vec<Cookie>> {
    let root = match config.profile.as_deref() {
        Some(path) if is_path_like(path) => FileUtils::expand_path(path)?,
        profile => {
            let base = browser.user_data_dir().ok_or_else(|| {
                SyncError::Config("Cannot determine browser data directory".to_string())
            })?;
            profile_root(&base, profile)
        }
    };
    if !root.exists() {
        return Err(SyncError::FileNotFound(format!(
            "Browser data dir not found: {:?}",
            root
        )));
    }
    let cookie_db = find_newest(&root, COOKIE_DB)
        .ok_or_else(|| SyncError::FileNotFound("Chromium cookies database not found".to_string()))?;
    log::debug!("reading {:?} cookies from {:?}", browser, cookie_db);

    let copy = open_database_copy(&cookie_db, "chromium")?;
    let conn = &copy.conn;
    let meta_version = read_meta_version(conn);
    let decryptor = CookieDecryptor::new(browser, config.keyring.as_deref(), meta_version)?;

    let columns = table_columns(conn, "cookies")?;
    let has = |name: &str| columns.iter().any(|c| c == name);
    let secure_column = if has("is_secure") { "is_secure" } else { "secure" };
    let http_only_column = if has("is_httponly") {
        "is_httponly"
    } else if has("httponly") {
        "httponly"
    } else {
        "0"
    };
    let query = format!(
        "SELECT host_key, name, value, encrypted_value, path, expires_utc, {}, {} FROM cookies",
        secure_column, http_only_column
    );

    let mut stmt = conn
        .prepare(&query)
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to prepare cookie query: {}", e)))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to query cookies: {}", e)))?;

    let mut cookies = Vec::new();
    let mut undecryptable = 0usize;
    while let Some(row) = rows
        .next()
        .map_err(|e| SyncError::BrowserCookie(format!("Failed to read cookie row: {}", e)))?
    {
        match row_to_cookie(row, &decryptor)? {
            Some(cookie) => cookies.push(cookie),
            None => undecryptable += 1,
        }
    }
    if undecryptable > 0 {
        log::warn!("Skipped {} cookies that could not be decrypted", undecryptable);
    }
    Ok(cookies)
}

fn read_meta_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
        row.get::<_, String>(0)
    })
    .ok()
    .and_then(|value| value.parse().ok())
    .unwrap_or(0)
}

fn row_to_cookie(row: &Row<'_>, decryptor: &CookieDecryptor) -> Result<Option<Cookie>> {
    let read_err = |what: &str, e: rusqlite::Error| {
        SyncError::BrowserCookie(format!("Failed to read cookie {}: {}", what, e))
    };
    let host_key: String = row.get(0).map_err(|e| read_err("host", e))?;
    let name: String = row.get(1).map_err(|e| read_err("name", e))?;
    let value: String = row.get(2).map_err(|e| read_err("value", e))?;
    let encrypted_value = match row.get_ref(3).map_err(|e| read_err("ciphertext", e))? {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => bytes.to_vec(),
        _ => Vec::new(),
    };
    let path: String = row.get(4).map_err(|e| read_err("path", e))?;
    let expires_utc: i64 = row.get(5).map_err(|e| read_err("expiry", e))?;
    let secure: i64 = row.get(6).map_err(|e| read_err("secure flag", e))?;
    let http_only: i64 = row.get(7).map_err(|e| read_err("httponly flag", e))?;

    let value = if !value.is_empty() {
        value
    } else if !encrypted_value.is_empty() {
        match decryptor.decrypt(&encrypted_value) {
            Some(value) => value,
            None => return Ok(None),
        }
    } else {
        String::new()
    };

    Ok(Some(Cookie {
        name,
        value,
        domain: host_key,
        path,
        secure: secure != 0,
        http_only: http_only != 0,
        expires: chromium_expires_to_unix_seconds(expires_utc),
    }))
}

/// `expires_utc` counts microseconds since 1601-01-01.
fn chromium_expires_to_unix_seconds(expires_utc: i64) -> Option<i64> {
    if expires_utc == 0 {
        return None;
    }
    let unix_seconds = (expires_utc / 1_000_000) - WINDOWS_EPOCH_OFFSET;
    (unix_seconds > 0).then_some(unix_seconds)
}

struct CookieDecryptor {
    v10_keys: Vec<[u8; KEY_LENGTH]>,
    v11_keys: Vec<[u8; KEY_LENGTH]>,
    /// Since DB version 24 the plaintext starts with a 32 byte host digest.
    hash_prefix: bool,
}

impl CookieDecryptor {
    fn new(browser: ChromiumBrowser, keyring: Option<&str>, meta_version: i64) -> Result<Self> {
        let (v10_keys, v11_keys) = os::keys(browser, keyring)?;
        Ok(Self {
            v10_keys,
            v11_keys,
            hash_prefix: meta_version >= 24,
        })
    }

    fn decrypt(&self, encrypted_value: &[u8]) -> Option<String> {
        if encrypted_value.len() < 3 {
            return None;
        }
        let (version, ciphertext) = encrypted_value.split_at(3);
        let keys = match version {
            b"v10" => &self.v10_keys,
            b"v11" => &self.v11_keys,
            other => {
                log::warn!("Unknown Chromium cookie version: {:?}", other);
                return None;
            }
        };
        keys.iter().find_map(|key| {
            let plaintext = decrypt_aes_cbc(ciphertext, key)?;
            let trimmed = if self.hash_prefix && plaintext.len() > 32 {
                &plaintext[32..]
            } else {
                &plaintext[..]
            };
            String::from_utf8(trimmed.to_vec()).ok()
        })
    }
}

fn derive_key(password: &[u8], iterations: u32) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha1>(password, KEY_DERIVE_SALT, iterations, &mut key);
    key
}

fn decrypt_aes_cbc(ciphertext: &[u8], key: &[u8; KEY_LENGTH]) -> Option<Vec<u8>> {
    let mut buffer = ciphertext.to_vec();
    let decryptor = cbc::Decryptor::<Aes128>::new_from_slices(key, AES_IV).ok()?;
    decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .ok()
        .map(|plaintext| plaintext.to_vec())
}

#[cfg(target_os = "linux")]
mod os {
    use super::{derive_key, ChromiumBrowser, KEY_LENGTH};
    use crate::error::{Result, SyncError};
    use secret_service::blocking::SecretService;
    use secret_service::EncryptionType;

    const KEY_DERIVE_ITERATIONS: u32 = 1;
    const V10_PASSWORD: &[u8] = b"peanuts";

    type Keys = (Vec<[u8; KEY_LENGTH]>, Vec<[u8; KEY_LENGTH]>);

    pub(super) fn keys(browser: ChromiumBrowser, keyring: Option<&str>) -> Result<Keys> {
        let empty = derive_key(b"", KEY_DERIVE_ITERATIONS);
        let v10 = vec![derive_key(V10_PASSWORD, KEY_DERIVE_ITERATIONS), empty];

        let use_secret_service = match keyring.map(|k| k.to_lowercase()) {
            None => true,
            Some(k) if k == "gnome" || k == "gnomekeyring" || k == "secretservice" => true,
            Some(k) if k == "basic" || k == "basictext" => false,
            Some(other) => {
                return Err(SyncError::Config(format!("Unsupported keyring: {}", other)))
            }
        };

        let mut v11 = Vec::new();
        if use_secret_service {
            if let Some(password) = safe_storage_password(browser.keyring_name()) {
                v11.push(derive_key(&password, KEY_DERIVE_ITERATIONS));
            }
        }
        v11.push(empty);
        Ok((v10, v11))
    }

    fn safe_storage_password(keyring_name: &str) -> Option<Vec<u8>> {
        let service = match SecretService::connect(EncryptionType::Dh) {
            Ok(service) => service,
            Err(err) => {
                log::warn!("Failed to connect to secret service: {}", err);
                return None;
            }
        };
        let collection = service
            .get_default_collection()
            .or_else(|_| service.get_any_collection())
            .map_err(|err| log::warn!("Failed to read keyring collection: {}", err))
            .ok()?;
        let items = collection
            .get_all_items()
            .map_err(|err| log::warn!("Failed to read keyring items: {}", err))
            .ok()?;

        let label = format!("{} Safe Storage", keyring_name);
        let item = items
            .into_iter()
            .find(|item| item.get_label().unwrap_or_default() == label)?;
        if item.is_locked().unwrap_or(false) {
            if let Err(err) = item.unlock() {
                log::warn!("Failed to unlock keyring item: {}", err);
            }
        }
        item.get_secret()
            .map_err(|err| log::warn!("Failed to read keyring secret: {}", err))
            .ok()
    }
}

#[cfg(target_os = "macos")]
mod os {
    use super::{derive_key, ChromiumBrowser, KEY_LENGTH};
    use crate::error::Result;
    use security_framework::passwords::get_generic_password;

    const KEY_DERIVE_ITERATIONS: u32 = 1003;

    type Keys = (Vec<[u8; KEY_LENGTH]>, Vec<[u8; KEY_LENGTH]>);

    pub(super) fn keys(browser: ChromiumBrowser, _keyring: Option<&str>) -> Result<Keys> {
        let account = browser.keyring_name();
        let service = format!("{} Safe Storage", account);
        let v10 = match get_generic_password(&service, account) {
            Ok(password) => vec![derive_key(&password, KEY_DERIVE_ITERATIONS)],
            Err(err) => {
                log::warn!("Failed to read keychain password for {}: {}", account, err);
                Vec::new()
            }
        };
        Ok((v10, Vec::new()))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod os {
    use super::{ChromiumBrowser, KEY_LENGTH};
    use crate::error::Result;

    type Keys = (Vec<[u8; KEY_LENGTH]>, Vec<[u8; KEY_LENGTH]>);

    pub(super) fn keys(_browser: ChromiumBrowser, _keyring: Option<&str>) -> Result<Keys> {
        log::warn!("Encrypted Chromium cookies are not supported on this platform");
        Ok((Vec::new(), Vec::new()))
    }
}
