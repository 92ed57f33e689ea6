//! Login and logout

use reqwest::Method;
use serde_json::{json, Value};

use crate::error::{Result, SyncError};
use crate::http::response::{self, TokenGrant};
use crate::http::ApiClient;
use crate::model::{Badge, Session};
use crate::store::{keys, KeyValueStore};

/// Every key a logout wipes
const SESSION_KEYS: &[&str] = &[
    keys::ACCESS_TOKEN,
    keys::REFRESH_TOKEN,
    keys::USER_EMAIL,
    keys::USER_NAME,
    keys::CREDENTIAL_ID,
    keys::LAST_SYNC_AT,
    keys::LAST_SYNC_STATUS,
    keys::LAST_SYNC_ERROR,
    keys::LAST_COOKIE_COUNTS,
    keys::LAST_COOKIE_COUNT,
];

/// A successful login
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedIn {
    pub session: Session,
    pub user: Option<Value>,
}

pub struct SessionManager {
    api: ApiClient,
}

impl SessionManager {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn store(&self) -> &dyn KeyValueStore {
        self.api.store().as_ref()
    }

    pub fn current(&self) -> Result<Session> {
        Session::load(self.store())
    }

    /// Exchange credentials for a token pair and persist the session.
    /// `api_url`, when given, becomes the stored base URL override first.
    pub async fn login(&self, email: &str, password: &str, api_url: Option<&str>) -> Result<LoggedIn> {
        if let Some(api_url) = api_url.filter(|url| !url.is_empty()) {
            crate::utils::UrlUtils::validate_url(api_url)?;
            self.store()
                .set_json(json!({ keys::API_BASE_URL: api_url }))?;
        }

        let path = self.api.endpoints().login.clone();
        let body = json!({ "email": email, "password": password });
        let reply = self.api.execute(Method::POST, &path, Some(&body), None).await?;

        let status = reply.status();
        let text = reply.text().await?;
        let parsed: Option<Value> = serde_json::from_str(&text).ok();
        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(response::server_message)
                .unwrap_or_else(|| "Login failed".to_string());
            log::warn!("Login rejected ({}): {}", status.as_u16(), message);
            return Err(SyncError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let grant = parsed
            .as_ref()
            .and_then(TokenGrant::from_body)
            .ok_or_else(|| SyncError::Api {
                status: status.as_u16(),
                message: "Login response did not include an access token".to_string(),
            })?;

        let session = Session {
            user_name: grant.display_name().unwrap_or_else(|| email.to_string()),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or_default(),
            user_email: email.to_string(),
        };
        session.save(self.store())?;
        // A new account never inherits the previous account's record.
        self.store().remove(&[keys::CREDENTIAL_ID])?;

        log::info!("Logged in as {}", session.user_email);
        Ok(LoggedIn {
            session,
            user: grant.user,
        })
    }

    /// Tell the backend (best effort), then clear everything regardless.
    pub async fn logout(&self) -> Result<()> {
        let session = self.current()?;
        if session.is_logged_in() {
            if let Some(path) = self.api.endpoints().logout.clone() {
                let body = json!({ "refresh_token": session.refresh_token });
                match self
                    .api
                    .execute(Method::POST, &path, Some(&body), Some(&session.access_token))
                    .await
                {
                    Ok(reply) if !reply.status().is_success() => {
                        log::debug!("Logout notification answered {}", reply.status().as_u16())
                    }
                    Ok(_) => {}
                    Err(err) => log::debug!("Logout notification failed: {}", err),
                }
            }
        }

        self.store().remove(SESSION_KEYS)?;
        Badge::Neutral.apply(self.store())?;
        log::info!("Logged out");
        Ok(())
    }
}
