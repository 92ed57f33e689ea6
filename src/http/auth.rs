//! Access-token refresh

use reqwest::Method;
use serde_json::{json, Map, Value};

use super::response::{self, TokenGrant};
use super::ApiClient;
use crate::error::Result;
use crate::model::Badge;
use crate::store::keys;

impl ApiClient {
    /// Exchange the stored refresh token for a new pair. Returns `true` once
    /// new tokens are persisted. Never retries; a rejected refresh token
    /// logs the user out.
    pub async fn refresh(&self) -> bool {
        match self.try_refresh().await {
            Ok(refreshed) => refreshed,
            Err(err) => {
                log::error!("Token refresh failed: {}", err);
                false
            }
        }
    }

    async fn try_refresh(&self) -> Result<bool> {
        let refresh_token = match self.store().get_string(keys::REFRESH_TOKEN)? {
            Some(token) => token,
            None => {
                log::debug!("No refresh token stored, skipping refresh");
                return Ok(false);
            }
        };

        let path = self.endpoints().refresh.clone();
        let body = json!({ "refresh_token": refresh_token });
        let reply = self.execute(Method::POST, &path, Some(&body), None).await?;

        if !reply.status().is_success() {
            log::warn!(
                "Refresh token rejected ({}), clearing session",
                reply.status().as_u16()
            );
            self.store()
                .remove(&[keys::ACCESS_TOKEN, keys::REFRESH_TOKEN])?;
            Badge::AuthExpired.apply(self.store().as_ref())?;
            return Ok(false);
        }

        let body = response::read_json(reply).await?;
        let grant = match TokenGrant::from_body(&body) {
            Some(grant) => grant,
            None => {
                log::warn!("Refresh response carried no access token");
                return Ok(false);
            }
        };

        let mut entries = Map::new();
        entries.insert(keys::ACCESS_TOKEN.to_string(), Value::from(grant.access_token));
        // Rotation is optional server-side; keep the old token otherwise.
        entries.insert(
            keys::REFRESH_TOKEN.to_string(),
            Value::from(grant.refresh_token.unwrap_or(refresh_token)),
        );
        self.store().set(entries)?;

        log::info!("Access token refreshed");
        Ok(true)
    }
}
