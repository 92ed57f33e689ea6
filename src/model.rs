//! Session, sync result and badge state as they sit in the store

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::store::{keys, KeyValueStore};

/// Per-domain cookie counts, keyed by the logical domain name
pub type CookieCounts = BTreeMap<String, usize>;

/// The logged-in account. An empty access token means logged out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_email: String,
    pub user_name: String,
}

impl Session {
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        Ok(Self {
            access_token: store.get_string(keys::ACCESS_TOKEN)?.unwrap_or_default(),
            refresh_token: store.get_string(keys::REFRESH_TOKEN)?.unwrap_or_default(),
            user_email: store.get_string(keys::USER_EMAIL)?.unwrap_or_default(),
            user_name: store.get_string(keys::USER_NAME)?.unwrap_or_default(),
        })
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set_json(json!({
            keys::ACCESS_TOKEN: self.access_token,
            keys::REFRESH_TOKEN: self.refresh_token,
            keys::USER_EMAIL: self.user_email,
            keys::USER_NAME: self.user_name,
        }))
    }

    pub fn is_logged_in(&self) -> bool {
        !self.access_token.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    NoCookies,
    NoCredential,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::NoCookies => "no_cookies",
            SyncStatus::NoCredential => "no_credential",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(SyncStatus::Success),
            "no_cookies" => Ok(SyncStatus::NoCookies),
            "no_credential" => Ok(SyncStatus::NoCredential),
            "error" => Ok(SyncStatus::Error),
            _ => Err(()),
        }
    }
}

/// Outcome of one orchestrator run. Each run replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    pub timestamp: DateTime<Utc>,
    pub cookie_counts: CookieCounts,
    pub error_message: Option<String>,
}

impl SyncResult {
    pub fn new(status: SyncStatus, cookie_counts: CookieCounts) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            cookie_counts,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>, cookie_counts: CookieCounts) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(SyncStatus::Error, cookie_counts)
        }
    }

    pub fn total_cookies(&self) -> usize {
        self.cookie_counts.values().sum()
    }

    pub fn persist(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set_json(json!({
            keys::LAST_SYNC_AT: iso_timestamp(&self.timestamp),
            keys::LAST_SYNC_STATUS: self.status.as_str(),
            keys::LAST_SYNC_ERROR: self.error_message.clone().unwrap_or_default(),
            keys::LAST_COOKIE_COUNTS: self.cookie_counts,
            keys::LAST_COOKIE_COUNT: self.total_cookies(),
        }))
    }

    /// Last persisted result, if any run has been recorded since logout.
    pub fn load(store: &dyn KeyValueStore) -> Result<Option<Self>> {
        let status = match store
            .get_string(keys::LAST_SYNC_STATUS)?
            .and_then(|raw| raw.parse::<SyncStatus>().ok())
        {
            Some(status) => status,
            None => return Ok(None),
        };
        let timestamp = store
            .get_string(keys::LAST_SYNC_AT)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_default();
        let cookie_counts = match store.get(keys::LAST_COOKIE_COUNTS)? {
            Some(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
            _ => CookieCounts::new(),
        };
        Ok(Some(Self {
            status,
            timestamp,
            cookie_counts,
            error_message: store.get_string(keys::LAST_SYNC_ERROR)?,
        }))
    }
}

pub fn iso_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The small status indicator next to the app name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Neutral,
    Success,
    Warning,
    Error,
    AuthExpired,
}

impl Badge {
    pub fn text(&self) -> &'static str {
        match self {
            Badge::Neutral => "",
            Badge::Success => "✓",
            Badge::Warning => "0",
            Badge::Error => "✗",
            Badge::AuthExpired => "!",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Badge::Neutral => "#999999",
            Badge::Success => "#4CAF50",
            Badge::Warning => "#FF9800",
            Badge::Error | Badge::AuthExpired => "#F44336",
        }
    }

    pub fn apply(&self, store: &dyn KeyValueStore) -> Result<()> {
        log::debug!("badge -> {:?} ({:?} {})", self, self.text(), self.color());
        store.set_json(json!({
            keys::BADGE_TEXT: self.text(),
            keys::BADGE_COLOR: self.color(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn session_round_trips_through_store() {
        let store = MemoryStore::new();
        assert!(!Session::load(&store).expect("load").is_logged_in());

        let session = Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            user_email: "user@example.com".to_string(),
            user_name: "User".to_string(),
        };
        session.save(&store).expect("save");
        assert_eq!(Session::load(&store).expect("load"), session);
    }

    #[test]
    fn sync_result_persists_counts_and_total() {
        let store = MemoryStore::new();
        let counts = CookieCounts::from([("ml".to_string(), 3), ("amazon".to_string(), 2)]);
        let result = SyncResult::new(SyncStatus::Success, counts.clone());
        result.persist(&store).expect("persist");

        assert_eq!(
            store.get(keys::LAST_COOKIE_COUNT).expect("get"),
            Some(json!(5))
        );
        let loaded = SyncResult::load(&store).expect("load").expect("present");
        assert_eq!(loaded.status, SyncStatus::Success);
        assert_eq!(loaded.cookie_counts, counts);
        assert_eq!(loaded.error_message, None);
    }

    #[test]
    fn failed_result_keeps_message_verbatim() {
        let store = MemoryStore::new();
        SyncResult::failed("AUTH_EXPIRED", CookieCounts::new())
            .persist(&store)
            .expect("persist");
        let loaded = SyncResult::load(&store).expect("load").expect("present");
        assert_eq!(loaded.status, SyncStatus::Error);
        assert_eq!(loaded.error_message.as_deref(), Some("AUTH_EXPIRED"));
    }

    #[test]
    fn badge_apply_writes_text_and_color() {
        let store = MemoryStore::new();
        Badge::Warning.apply(&store).expect("apply");
        assert_eq!(
            store.get_string(keys::BADGE_COLOR).expect("get"),
            Some("#FF9800".to_string())
        );
    }
}
