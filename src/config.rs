//! Configuration management for cookie-sync

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

const APP_DIR: &str = "cookie-sync";

/// Longest accepted timer period (one year).
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;
pub const MAX_INTERVAL: Duration = Duration::from_secs(MAX_INTERVAL_MINUTES * 60);

/// Browser types supported for cookie extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Chromium,
    Firefox,
    Edge,
    Brave,
    Opera,
    Vivaldi,
}

impl FromStr for Browser {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chrome" => Ok(Browser::Chrome),
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "edge" => Ok(Browser::Edge),
            "brave" => Ok(Browser::Brave),
            "opera" => Ok(Browser::Opera),
            "vivaldi" => Ok(Browser::Vivaldi),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Browser::Chrome => "chrome",
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Edge => "edge",
            Browser::Brave => "brave",
            Browser::Opera => "opera",
            Browser::Vivaldi => "vivaldi",
        };
        write!(f, "{}", name)
    }
}

/// Which browser jar to harvest from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookieConfig {
    pub browser: Browser,
    pub profile: Option<String>,
    pub keyring: Option<String>,
}

impl BrowserCookieConfig {
    /// Parse `BROWSER[+KEYRING][:PROFILE]`. The profile may itself contain
    /// colons (Windows paths), so only the first one splits.
    pub fn parse(input: &str) -> Result<Self> {
        let (browser_part, profile) = match input.split_once(':') {
            Some((head, tail)) if !tail.is_empty() => (head, Some(tail.to_string())),
            Some((head, _)) => (head, None),
            None => (input, None),
        };
        let (browser_str, keyring) = match browser_part.split_once('+') {
            Some((browser, keyring)) => (browser, Some(keyring.to_string())),
            None => (browser_part, None),
        };

        let browser = browser_str.trim().parse::<Browser>().map_err(|_| {
            SyncError::Config(format!("Unsupported browser: {}", browser_str))
        })?;

        Ok(BrowserCookieConfig {
            browser,
            profile,
            keyring,
        })
    }
}

/// Logical target name mapped to the cookie domain it is harvested from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTarget {
    pub name: String,
    pub domain: String,
}

impl DomainTarget {
    pub fn new(name: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
        }
    }
}

/// Backend auth endpoint paths, relative to the API base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub refresh: String,
    pub logout: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: Some("/auth/logout".to_string()),
        }
    }
}

/// How harvested cookies reach the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Submission {
    /// One POST carrying every domain's cookie string
    Receiver { path: String },
    /// PATCH of a platform credential record looked up on the account
    Credential { platform: String },
}

impl Submission {
    pub fn credentials_path(platform: &str) -> String {
        format!("/platforms/{}/credentials", platform)
    }

    pub fn credential_path(platform: &str, id: &str) -> String {
        format!("{}/{}", Self::credentials_path(platform), id)
    }
}

/// Ready-made backend layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Receiver,
    Credential,
}

impl FromStr for Preset {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "receiver" => Ok(Preset::Receiver),
            "credential" => Ok(Preset::Credential),
            _ => Err(()),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub sync_interval_minutes: u64,
    pub token_refresh_interval_minutes: u64,
    /// `BROWSER[+KEYRING][:PROFILE]`
    pub browser: String,
    pub store_path: Option<PathBuf>,
    pub endpoints: Endpoints,
    pub submission: Submission,
    pub domains: Vec<DomainTarget>,
}

impl Default for Config {
    fn default() -> Self {
        Config::preset(Preset::Credential)
    }
}

impl Config {
    pub fn preset(preset: Preset) -> Self {
        let base = Config {
            api_base_url: None,
            user_agent: format!("cookie-sync/{}", crate::VERSION),
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
            sync_interval_minutes: 30,
            token_refresh_interval_minutes: 50,
            browser: "firefox".to_string(),
            store_path: None,
            endpoints: Endpoints::default(),
            submission: Submission::Credential {
                platform: "mercadolivre".to_string(),
            },
            domains: vec![DomainTarget::new("ml", ".mercadolivre.com.br")],
        };

        match preset {
            Preset::Credential => base,
            Preset::Receiver => Config {
                token_refresh_interval_minutes: 45,
                browser: "chrome".to_string(),
                endpoints: Endpoints {
                    login: "/external-auth".to_string(),
                    refresh: "/external-auth".to_string(),
                    logout: None,
                },
                submission: Submission::Receiver {
                    path: "/external-data-receiver".to_string(),
                },
                domains: vec![
                    DomainTarget::new("ml", ".mercadolivre.com.br"),
                    DomainTarget::new("amazon", ".amazon.com.br"),
                ],
                ..base
            },
        }
    }

    /// Load from an explicit file, else the default location if it exists,
    /// else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(SyncError::FileNotFound(format!(
                        "Config file not found: {:?}",
                        path
                    )));
                }
                Self::from_file(path)?
            }
            None => match default_config_path().filter(|path| path.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Config::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parse a config file. An optional top-level `preset` key picks the
    /// base layout; every other top-level key replaces the preset's value.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut overrides: toml::Table = toml::from_str(raw)?;
        let preset = match overrides.remove("preset") {
            None => Preset::Credential,
            Some(toml::Value::String(name)) => name
                .parse()
                .map_err(|_| SyncError::Config(format!("Unknown preset: {}", name)))?,
            Some(other) => {
                return Err(SyncError::Config(format!(
                    "preset must be a string, got {}",
                    other.type_str()
                )))
            }
        };

        let base = Config::preset(preset);
        // TOML has no null, so an unset logout endpoint cannot round-trip.
        let logout_given = overrides
            .get("endpoints")
            .and_then(|endpoints| endpoints.get("logout"))
            .is_some();

        let mut merged = toml::Table::try_from(&base)
            .map_err(|e| SyncError::Config(format!("Failed to build preset: {}", e)))?;
        merged.extend(overrides);
        let mut config: Config = toml::Value::Table(merged).try_into()?;
        if !logout_given {
            config.endpoints.logout = base.endpoints.logout;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            return Err(SyncError::Config(
                "At least one cookie domain must be configured".to_string(),
            ));
        }
        for (index, target) in self.domains.iter().enumerate() {
            if target.name.trim().is_empty() || target.domain.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "Domain entry {} needs both a name and a domain",
                    index
                )));
            }
            if self.domains[..index].iter().any(|t| t.name == target.name) {
                return Err(SyncError::Config(format!(
                    "Duplicate domain name: {}",
                    target.name
                )));
            }
        }
        if self.sync_interval_minutes == 0 || self.token_refresh_interval_minutes == 0 {
            return Err(SyncError::Config(
                "Timer intervals must be at least one minute".to_string(),
            ));
        }
        if self.sync_interval_minutes > MAX_INTERVAL_MINUTES
            || self.token_refresh_interval_minutes > MAX_INTERVAL_MINUTES
        {
            return Err(SyncError::Config(format!(
                "Timer intervals must not exceed {} minutes",
                MAX_INTERVAL_MINUTES
            )));
        }
        BrowserCookieConfig::parse(&self.browser)?;
        Ok(())
    }

    pub fn browser_config(&self) -> Result<BrowserCookieConfig> {
        BrowserCookieConfig::parse(&self.browser)
    }

    pub fn sync_interval(&self) -> Duration {
        minutes(self.sync_interval_minutes)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        minutes(self.token_refresh_interval_minutes)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("store.json"))
            .ok_or_else(|| SyncError::Config("Cannot determine data directory".to_string()))
    }
}

/// Minutes as a duration, capped at [`MAX_INTERVAL`].
fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.min(MAX_INTERVAL_MINUTES) * 60)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_config_parses_keyring_and_profile() {
        let config = BrowserCookieConfig::parse("chrome+gnome:Profile 1").expect("parse");
        assert_eq!(config.browser, Browser::Chrome);
        assert_eq!(config.keyring.as_deref(), Some("gnome"));
        assert_eq!(config.profile.as_deref(), Some("Profile 1"));

        let config = BrowserCookieConfig::parse("firefox").expect("parse");
        assert_eq!(config.browser, Browser::Firefox);
        assert!(config.profile.is_none());
        assert!(config.keyring.is_none());
    }

    #[test]
    fn browser_config_keeps_path_profiles_intact() {
        let config = BrowserCookieConfig::parse("firefox:C:\\profiles\\abc").expect("parse");
        assert_eq!(config.profile.as_deref(), Some("C:\\profiles\\abc"));
    }

    #[test]
    fn browser_config_rejects_unknown_browser() {
        let err = BrowserCookieConfig::parse("netscape").expect_err("unknown");
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn toml_overrides_merge_with_defaults() {
        let config = Config::from_toml(
            r#"
            api_base_url = "https://api.example.test/v1"
            sync_interval_minutes = 15

            [submission]
            kind = "receiver"
            path = "/ingest"

            [[domains]]
            name = "shop"
            domain = ".shop.example"
            "#,
        )
        .expect("parse");

        assert_eq!(config.api_base_url.as_deref(), Some("https://api.example.test/v1"));
        assert_eq!(config.sync_interval(), Duration::from_secs(900));
        assert_eq!(config.token_refresh_interval_minutes, 50);
        assert_eq!(
            config.submission,
            Submission::Receiver {
                path: "/ingest".to_string()
            }
        );
        assert_eq!(config.domains, vec![DomainTarget::new("shop", ".shop.example")]);
        assert_eq!(config.endpoints.login, "/auth/login");
        config.validate().expect("valid");
    }

    #[test]
    fn toml_preset_selects_base_layout() {
        let config = Config::from_toml(
            r#"
            preset = "receiver"
            sync_interval_minutes = 10
            "#,
        )
        .expect("parse");
        assert_eq!(config.endpoints.login, "/external-auth");
        assert_eq!(config.token_refresh_interval_minutes, 45);
        assert_eq!(config.sync_interval_minutes, 10);
        assert_eq!(config.domains.len(), 2);
        assert!(config.endpoints.logout.is_none());

        let err = Config::from_toml("preset = \"other\"").expect_err("unknown preset");
        assert!(matches!(err, SyncError::Config(_)));
        assert_eq!(Config::from_toml("").expect("empty"), Config::default());
    }

    #[test]
    fn receiver_preset_shares_auth_endpoint() {
        let config = Config::preset(Preset::Receiver);
        assert_eq!(config.endpoints.login, config.endpoints.refresh);
        assert!(config.endpoints.logout.is_none());
        assert_eq!(config.domains.len(), 2);
        assert_eq!(config.token_refresh_interval_minutes, 45);
    }

    #[test]
    fn validate_rejects_duplicate_names_and_zero_intervals() {
        let mut config = Config::default();
        config.domains.push(DomainTarget::new("ml", ".other.example"));
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        let config = Config {
            sync_interval_minutes: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn huge_intervals_are_rejected_without_overflow() {
        let config = Config::from_toml("sync_interval_minutes = 200000000000000000\n")
            .expect("parses");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
        assert_eq!(config.sync_interval(), MAX_INTERVAL);

        let config = Config {
            token_refresh_interval_minutes: MAX_INTERVAL_MINUTES,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.token_refresh_interval(), MAX_INTERVAL);
    }

    #[test]
    fn load_reports_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).expect_err("missing");
        assert!(matches!(err, SyncError::FileNotFound(_)));
    }
}
