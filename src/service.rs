//! Request/response surface for front ends
//!
//! A front end (the CLI, a status widget) sends one of three requests and
//! gets `{success, error?, user?}` back. [`Service`] also owns the pieces the
//! scheduler drives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::Result;
use crate::harvest::CookieSource;
use crate::http::ApiClient;
use crate::model::{Session, SyncResult};
use crate::session::{LoggedIn, SessionManager};
use crate::store::{keys, SharedStore};
use crate::sync::{SyncOrchestrator, SyncOutcome, Trigger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    SyncNow,
    Login {
        email: String,
        password: String,
        #[serde(default, rename = "apiUrl", skip_serializing_if = "Option::is_none")]
        api_url: Option<String>,
    },
    Logout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            user: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            user: None,
        }
    }
}

impl From<&SyncOutcome> for Response {
    fn from(outcome: &SyncOutcome) -> Self {
        match outcome.error_message() {
            None => Response::ok(),
            Some(error) => Response::failed(error),
        }
    }
}

/// What a status view shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub logged_in: bool,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub api_base_url: Option<String>,
    pub credential_id: Option<String>,
    pub badge: Option<String>,
    pub last_sync: Option<SyncResult>,
}

pub struct Service<C> {
    sessions: SessionManager,
    orchestrator: SyncOrchestrator<C>,
}

impl<C: CookieSource> Service<C> {
    pub fn new(config: &Config, store: SharedStore, source: C) -> Result<Self> {
        let api = ApiClient::new(config, store)?;
        Ok(Self {
            sessions: SessionManager::new(api.clone()),
            orchestrator: SyncOrchestrator::new(api, source, config),
        })
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator<C> {
        &self.orchestrator
    }

    fn store(&self) -> &SharedStore {
        self.orchestrator.api().store()
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::SyncNow => Response::from(&self.sync_now().await),
            Request::Login {
                email,
                password,
                api_url,
            } => match self.login(&email, &password, api_url.as_deref()).await {
                Ok(logged_in) => Response {
                    user: logged_in.user,
                    ..Response::ok()
                },
                Err(err) => Response::failed(err.to_string()),
            },
            Request::Logout => match self.logout().await {
                Ok(()) => Response::ok(),
                Err(err) => Response::failed(err.to_string()),
            },
        }
    }

    pub async fn sync_now(&self) -> SyncOutcome {
        self.orchestrator.run(Trigger::Manual).await
    }

    pub async fn scheduled_sync(&self) -> SyncOutcome {
        self.orchestrator.run(Trigger::Schedule).await
    }

    /// Log in, then run one sync straight away. The login succeeds even
    /// when that first sync does not.
    pub async fn login(&self, email: &str, password: &str, api_url: Option<&str>) -> Result<LoggedIn> {
        let logged_in = self.sessions.login(email, password, api_url).await?;
        let outcome = self.orchestrator.run(Trigger::Login).await;
        if let Some(error) = outcome.error_message() {
            log::warn!("First sync after login did not succeed: {}", error);
        }
        Ok(logged_in)
    }

    pub async fn logout(&self) -> Result<()> {
        self.sessions.logout().await
    }

    pub async fn refresh(&self) -> bool {
        self.orchestrator.api().refresh().await
    }

    /// Refresh, then sync, when a session survived the restart.
    pub async fn startup(&self) {
        let logged_in = match self.sessions.current() {
            Ok(session) => session.is_logged_in(),
            Err(err) => {
                log::error!("Could not read session at startup: {}", err);
                return;
            }
        };
        if !logged_in {
            log::info!("No session stored, waiting for login");
            return;
        }
        log::info!("Refreshing token on startup");
        self.refresh().await;
        self.orchestrator.run(Trigger::Startup).await;
    }

    pub fn status(&self) -> Result<StatusReport> {
        let store = self.store().as_ref();
        let session = Session::load(store)?;
        let non_empty = |value: String| (!value.is_empty()).then_some(value);
        Ok(StatusReport {
            logged_in: session.is_logged_in(),
            user_email: non_empty(session.user_email),
            user_name: non_empty(session.user_name),
            api_base_url: self.orchestrator.api().base_url().ok(),
            credential_id: store.get_string(keys::CREDENTIAL_ID)?,
            badge: store.get_string(keys::BADGE_TEXT)?,
            last_sync: SyncResult::load(store)?,
        })
    }
}
