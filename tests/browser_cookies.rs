use cookie_sync::browser::BrowserCookieExtractor;
use cookie_sync::config::{Browser, BrowserCookieConfig, DomainTarget};
use cookie_sync::harvest::{harvest, CookieSource};
use rusqlite::Connection;
use std::path::Path;
use tempfile::tempdir;

/// Far enough ahead that fixtures never expire.
const FAR_FUTURE_SECS: i64 = 4_102_444_800; // 2100-01-01
const PAST_SECS: i64 = 946_684_800; // 2000-01-01

fn create_firefox_cookie_db(path: &Path) {
    let conn = Connection::open(path).expect("open firefox db");
    conn.execute_batch("PRAGMA user_version = 16;")
        .expect("set schema version");
    conn.execute(
        "CREATE TABLE moz_cookies (
            id INTEGER PRIMARY KEY,
            host TEXT,
            name TEXT,
            value TEXT,
            path TEXT,
            expiry INTEGER,
            isSecure INTEGER,
            isHttpOnly INTEGER
        )",
        [],
    )
    .expect("create moz_cookies");
    let rows = [
        (".mercadolivre.com.br", "ssid", "abc", FAR_FUTURE_SECS * 1000),
        ("www.mercadolivre.com.br", "orgid", "42", FAR_FUTURE_SECS * 1000),
        (".amazon.com.br", "session-id", "zzz", FAR_FUTURE_SECS * 1000),
        (".mercadolivre.com.br", "stale", "old", PAST_SECS * 1000),
    ];
    for (host, name, value, expiry) in rows {
        conn.execute(
            "INSERT INTO moz_cookies (host, name, value, path, expiry, isSecure, isHttpOnly)
             VALUES (?1, ?2, ?3, '/', ?4, 1, 0)",
            (host, name, value, expiry),
        )
        .expect("insert cookie");
    }
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn test_extract_firefox_cookies_from_profile_path() {
    let temp = tempdir().expect("tempdir");
    let profile = temp.path().join("abcd.default-release");
    std::fs::create_dir_all(&profile).expect("profile dir");
    create_firefox_cookie_db(&profile.join("cookies.sqlite"));

    let spec = format!("firefox:{}", temp.path().display());
    let config = BrowserCookieConfig::parse(&spec).expect("browser spec");
    assert_eq!(config.browser, Browser::Firefox);
    let extractor = BrowserCookieExtractor::new(config);

    let all = extractor.extract_cookies().expect("cookies");
    assert_eq!(all.len(), 3, "expired cookie is dropped");
    let ssid = all.iter().find(|c| c.name == "ssid").expect("ssid");
    assert!(ssid.secure);
    assert_eq!(ssid.expires, Some(FAR_FUTURE_SECS));

    let ml = extractor
        .get_all(".mercadolivre.com.br")
        .await
        .expect("ml cookies");
    let names: Vec<_> = ml.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["ssid", "orgid"]);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn test_harvest_splits_one_jar_read_across_targets() {
    let temp = tempdir().expect("tempdir");
    let profile = temp.path().join("abcd.default-release");
    std::fs::create_dir_all(&profile).expect("profile dir");
    create_firefox_cookie_db(&profile.join("cookies.sqlite"));

    let spec = format!("firefox:{}", temp.path().display());
    let extractor = BrowserCookieExtractor::new(BrowserCookieConfig::parse(&spec).expect("spec"));
    let targets = vec![
        DomainTarget::new("ml", ".mercadolivre.com.br"),
        DomainTarget::new("amazon", ".amazon.com.br"),
        DomainTarget::new("none", ".example.test"),
    ];

    let harvest = harvest(&extractor, &targets).await.expect("harvest");
    assert_eq!(
        harvest.domains[0].cookie_header().as_deref(),
        Some("ssid=abc; orgid=42")
    );
    assert_eq!(
        harvest.domains[1].cookie_header().as_deref(),
        Some("session-id=zzz")
    );
    assert_eq!(harvest.domains[2].cookie_header(), None);
}

#[test]
fn test_missing_firefox_database_is_reported() {
    let temp = tempdir().expect("tempdir");
    let spec = format!("firefox:{}", temp.path().display());
    let extractor = BrowserCookieExtractor::new(BrowserCookieConfig::parse(&spec).expect("spec"));
    let err = extractor.extract_cookies().expect_err("no database");
    assert!(err.to_string().contains("not found"));
}

#[cfg(target_os = "linux")]
fn create_chromium_cookie_db(path: &Path) {
    // Microseconds since 1601-01-01
    let expires_utc = (FAR_FUTURE_SECS + 11_644_473_600) * 1_000_000;
    let conn = Connection::open(path).expect("open chromium db");
    conn.execute("CREATE TABLE meta (key TEXT, value TEXT)", [])
        .expect("create meta");
    conn.execute("INSERT INTO meta (key, value) VALUES ('version', '24')", [])
        .expect("insert meta");
    conn.execute(
        "CREATE TABLE cookies (
            host_key TEXT,
            name TEXT,
            value TEXT,
            encrypted_value BLOB,
            path TEXT,
            expires_utc INTEGER,
            is_secure INTEGER,
            is_httponly INTEGER
        )",
        [],
    )
    .expect("create cookies");
    conn.execute(
        "INSERT INTO cookies (
            host_key, name, value, encrypted_value, path, expires_utc, is_secure, is_httponly
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            ".amazon.com.br",
            "session-id",
            "plain",
            Vec::<u8>::new(),
            "/",
            expires_utc,
            1i64,
            1i64,
        ),
    )
    .expect("insert cookie");
}

#[cfg(target_os = "linux")]
#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn test_extract_chromium_cookies_from_profile_path() {
    let temp = tempdir().expect("tempdir");
    let profile = temp.path().join("Default");
    std::fs::create_dir_all(&profile).expect("profile dir");
    create_chromium_cookie_db(&profile.join("Cookies"));

    // The basic keyring keeps the test away from the desktop secret store.
    let spec = format!("chromium+basic:{}", temp.path().display());
    let extractor = BrowserCookieExtractor::new(BrowserCookieConfig::parse(&spec).expect("spec"));

    let cookies = extractor.get_all(".amazon.com.br").await.expect("cookies");
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].value, "plain");
    assert!(cookies[0].http_only);
    assert_eq!(cookies[0].expires, Some(FAR_FUTURE_SECS));
}
