//! Authenticated backend client
//!
//! Every call carries the stored bearer token. A 401 triggers one token
//! refresh and one retry; the refresh itself and login are never retried.

use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde_json::Value;
use url::Url;

use crate::config::{Config, Endpoints};
use crate::error::{Result, SyncError};
use crate::store::{keys, SharedStore};
use crate::utils::UrlUtils;

pub mod auth;
pub mod response;

pub use response::TokenGrant;

/// HTTP client bound to the backend and the token store
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    store: SharedStore,
    default_base_url: Option<String>,
    endpoints: Endpoints,
}

impl ApiClient {
    pub fn new(config: &Config, store: SharedStore) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(SyncError::Http)?;

        Ok(Self {
            client,
            store,
            default_base_url: config.api_base_url.clone(),
            endpoints: config.endpoints.clone(),
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Stored `apiBaseUrl` override, else the configured URL
    pub fn base_url(&self) -> Result<String> {
        if let Some(url) = self.store.get_string(keys::API_BASE_URL)? {
            return Ok(url);
        }
        self.default_base_url
            .clone()
            .ok_or_else(|| SyncError::Config("API base URL is not configured".to_string()))
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        UrlUtils::join(&self.base_url()?, path)
    }

    fn is_auth_endpoint(&self, path: &str) -> bool {
        path == self.endpoints.login || path == self.endpoints.refresh
    }

    /// Authenticated JSON call with the refresh-and-retry-once rule.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let first = self.authorized(method.clone(), path, body).await?;
        if first.status() != StatusCode::UNAUTHORIZED || self.is_auth_endpoint(path) {
            return response::read_json(first).await;
        }

        log::info!("{} {} returned 401, refreshing access token", method, path);
        if !self.refresh().await {
            return Err(SyncError::AuthExpired);
        }

        let second = self.authorized(method, path, body).await?;
        response::read_json(second).await
    }

    async fn authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let token = self.store.get_string(keys::ACCESS_TOKEN)?;
        self.execute(method, path, body, token.as_deref()).await
    }

    /// One raw round trip. JSON headers always; bearer only when given.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = self.url_for(path)?;
        log::debug!("> {} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await.map_err(SyncError::Http)?;
        log::debug!("< {}", response.status());
        Ok(response)
    }
}
