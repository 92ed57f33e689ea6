//! Sync orchestration
//!
//! One run walks `Idle -> Collecting -> Submitting` and ends in exactly one
//! of `Success`, `NoCookies`, `NoCredential` or `Error`, recording a
//! [`SyncResult`] in the store. `NoCookies` and `NoCredential` are decided
//! while collecting, before anything is submitted. A run that finds nobody logged in stops
//! before `Collecting` and records nothing. Runs never propagate errors and
//! never retry a failed submission; the only retry is the HTTP client's
//! refresh-on-401.
//!
//! Runs in one process are serialized: the state lives behind an async
//! mutex that a run holds from start to finish.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::config::{Config, DomainTarget, Submission};
use crate::error::{Result, SyncError};
use crate::harvest::{self, CookieSource, Harvest};
use crate::http::ApiClient;
use crate::model::{iso_timestamp, Badge, Session, SyncResult, SyncStatus};
use crate::store::{keys, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Collecting,
    Submitting,
    Success,
    NoCookies,
    NoCredential,
    Error,
}

impl SyncState {
    /// Whether a run may move from `self` to `next`. Any state may fail.
    pub fn can_advance_to(self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Collecting)
                | (
                    Self::Collecting,
                    Self::Submitting | Self::NoCookies | Self::NoCredential
                )
                | (Self::Submitting, Self::Success)
                | (_, Self::Error)
        )
    }
}

/// What started a run; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Schedule,
    Manual,
    Login,
    Startup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Aborted before collecting; nothing was recorded.
    NotLoggedIn,
    Completed(SyncResult),
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Completed(result) if result.status == SyncStatus::Success)
    }

    /// Message for callers that only understand success/error.
    pub fn error_message(&self) -> Option<String> {
        match self {
            SyncOutcome::NotLoggedIn => Some(SyncError::NotLoggedIn.to_string()),
            SyncOutcome::Completed(result) => match result.status {
                SyncStatus::Success => None,
                SyncStatus::NoCookies => Some(SyncError::NoCookiesFound.to_string()),
                SyncStatus::NoCredential => Some(SyncError::NoCredentialFound.to_string()),
                SyncStatus::Error => Some(
                    result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "Sync failed".to_string()),
                ),
            },
        }
    }

    /// The recorded result, or the failure as a typed error.
    pub fn into_result(self) -> Result<SyncResult> {
        match self {
            SyncOutcome::NotLoggedIn => Err(SyncError::NotLoggedIn),
            SyncOutcome::Completed(result) => match result.status {
                SyncStatus::Success => Ok(result),
                SyncStatus::NoCookies => Err(SyncError::NoCookiesFound),
                SyncStatus::NoCredential => Err(SyncError::NoCredentialFound),
                SyncStatus::Error => Err(SyncError::SyncFailed(
                    result
                        .error_message
                        .unwrap_or_else(|| "Sync failed".to_string()),
                )),
            },
        }
    }

    pub fn result(&self) -> Option<&SyncResult> {
        match self {
            SyncOutcome::NotLoggedIn => None,
            SyncOutcome::Completed(result) => Some(result),
        }
    }
}

enum Delivery {
    Delivered,
    NoCredential,
}

pub struct SyncOrchestrator<C> {
    api: ApiClient,
    source: C,
    targets: Vec<DomainTarget>,
    submission: Submission,
    state: Mutex<SyncState>,
}

impl<C: CookieSource> SyncOrchestrator<C> {
    pub fn new(api: ApiClient, source: C, config: &Config) -> Self {
        Self {
            api,
            source,
            targets: config.domains.clone(),
            submission: config.submission.clone(),
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn store(&self) -> &dyn KeyValueStore {
        self.api.store().as_ref()
    }

    /// State of the last run, or `None` while one is in flight.
    pub fn state(&self) -> Option<SyncState> {
        self.state.try_lock().ok().map(|state| *state)
    }

    pub async fn run(&self, trigger: Trigger) -> SyncOutcome {
        let mut state = self.state.lock().await;
        *state = SyncState::Idle;
        log::debug!("sync run started ({:?})", trigger);

        match self.run_inner(&mut state).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // Only store failures reach this point.
                log::error!("Sync aborted: {}", err);
                advance(&mut state, SyncState::Error);
                let result = SyncResult::failed(err.to_string(), Default::default());
                if let Err(err) = result.persist(self.store()) {
                    log::error!("Could not record sync failure: {}", err);
                }
                SyncOutcome::Completed(result)
            }
        }
    }

    async fn run_inner(&self, state: &mut SyncState) -> Result<SyncOutcome> {
        let session = Session::load(self.store())?;
        if !session.is_logged_in() {
            log::info!("Not logged in, skipping sync");
            return Ok(SyncOutcome::NotLoggedIn);
        }

        advance(state, SyncState::Collecting);
        let harvest = match harvest::harvest(&self.source, &self.targets).await {
            Ok(harvest) => harvest,
            Err(err) => {
                let counts = Harvest::zero_counts(&self.targets);
                return self.finish(state, SyncResult::failed(err.to_string(), counts));
            }
        };

        if harvest.is_empty() {
            log::warn!("No cookies found for any configured domain");
            let counts = Harvest::zero_counts(&self.targets);
            return self.finish(state, SyncResult::new(SyncStatus::NoCookies, counts));
        }

        let counts = harvest.counts();
        let result = match self.deliver(state, &session, &harvest).await {
            Ok(Delivery::Delivered) => {
                log::info!("Synced {} cookies {:?}", harvest.total(), counts);
                SyncResult::new(SyncStatus::Success, counts)
            }
            Ok(Delivery::NoCredential) => {
                log::error!("No credential record found for this account");
                SyncResult::new(SyncStatus::NoCredential, counts)
            }
            Err(err) => {
                log::error!("Sync failed: {}", err);
                SyncResult::failed(err.to_string(), counts)
            }
        };
        self.finish(state, result)
    }

    fn finish(&self, state: &mut SyncState, result: SyncResult) -> Result<SyncOutcome> {
        let (next, badge) = match result.status {
            SyncStatus::Success => (SyncState::Success, Badge::Success),
            SyncStatus::NoCookies => (SyncState::NoCookies, Badge::Warning),
            SyncStatus::NoCredential => (SyncState::NoCredential, Badge::Error),
            SyncStatus::Error => (SyncState::Error, Badge::Error),
        };
        advance(state, next);
        result.persist(self.store())?;
        badge.apply(self.store())?;
        Ok(SyncOutcome::Completed(result))
    }

    /// Moves to `Submitting` only once there is somewhere to submit to.
    async fn deliver(
        &self,
        state: &mut SyncState,
        session: &Session,
        harvest: &Harvest,
    ) -> Result<Delivery> {
        match &self.submission {
            Submission::Receiver { path } => {
                advance(state, SyncState::Submitting);
                let payload = receiver_payload(&session.user_email, harvest, Utc::now());
                self.api.request(Method::POST, path, Some(&payload)).await?;
                Ok(Delivery::Delivered)
            }
            Submission::Credential { platform } => {
                let id = match self.resolve_credential(platform).await? {
                    Some(id) => id,
                    None => return Ok(Delivery::NoCredential),
                };
                advance(state, SyncState::Submitting);
                let payload = json!({ "credentials": { "cookies": combined_cookie_header(harvest) } });
                let path = Submission::credential_path(platform, &id);
                self.api.request(Method::PATCH, &path, Some(&payload)).await?;
                Ok(Delivery::Delivered)
            }
        }
    }

    /// Cached credential id, else the account's active (or first) record.
    /// Lookup failures count as "none found".
    async fn resolve_credential(&self, platform: &str) -> Result<Option<String>> {
        if let Some(id) = self.store().get_string(keys::CREDENTIAL_ID)? {
            return Ok(Some(id));
        }

        let path = Submission::credentials_path(platform);
        let listing = match self.api.request(Method::GET, &path, None).await {
            Ok(listing) => listing,
            Err(err) => {
                log::warn!("Credential lookup failed: {}", err);
                return Ok(None);
            }
        };

        let id = select_credential(&listing);
        if let Some(id) = &id {
            log::info!("Using credential {} for {}", id, platform);
            self.store().set_json(json!({ keys::CREDENTIAL_ID: id }))?;
        }
        Ok(id)
    }
}

fn advance(state: &mut SyncState, next: SyncState) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal sync transition {:?} -> {:?}",
        state,
        next
    );
    log::debug!("sync state {:?} -> {:?}", state, next);
    *state = next;
}

/// Body for the receiver endpoint. Domains without cookies are `null`.
pub fn receiver_payload(email: &str, harvest: &Harvest, at: DateTime<Utc>) -> Value {
    let mut payload = Map::new();
    payload.insert("email".to_string(), Value::from(email));
    for domain in &harvest.domains {
        payload.insert(
            format!("cookie_{}", domain.target.name),
            domain.cookie_header().map(Value::from).unwrap_or(Value::Null),
        );
    }
    payload.insert("logged_at".to_string(), Value::from(iso_timestamp(&at)));
    Value::Object(payload)
}

/// Every non-empty domain header, in configuration order
pub fn combined_cookie_header(harvest: &Harvest) -> String {
    harvest
        .domains
        .iter()
        .filter_map(|domain| domain.cookie_header())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pick the entry flagged `is_active`, else the first. Items come as a bare
/// array or under `data`.
pub fn select_credential(listing: &Value) -> Option<String> {
    let items = listing
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| listing.as_array())?;
    let chosen = items
        .iter()
        .find(|item| item.get("is_active").and_then(Value::as_bool) == Some(true))
        .or_else(|| items.first())?;
    match chosen.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
