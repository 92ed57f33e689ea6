//! Backend response decoding

use reqwest::StatusCode;
use serde_json::Value;

use crate::error::{Result, SyncError};

/// Decode a backend reply. Non-2xx becomes [`SyncError::Api`] with the
/// server's `message`/`error` or `HTTP <status>`. A 2xx reply without a JSON
/// body decodes to `null`.
pub async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;
    let body = parse_body(&text);
    if status.is_success() {
        return Ok(body.unwrap_or(Value::Null));
    }
    Err(api_error(status, body.as_ref()))
}

pub fn api_error(status: StatusCode, body: Option<&Value>) -> SyncError {
    let message = body
        .and_then(server_message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    SyncError::Api {
        status: status.as_u16(),
        message,
    }
}

fn parse_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

/// `message`, else `error` (when it is a string)
pub fn server_message(body: &Value) -> Option<String> {
    ["message", "error"].iter().find_map(|key| {
        body.get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Auth replies come wrapped as `{session: {...}}`, `{data: {...}}` or bare.
pub fn envelope(body: &Value) -> &Value {
    for key in ["session", "data"] {
        if let Some(inner) = body.get(key).filter(|v| v.is_object()) {
            return inner;
        }
    }
    body
}

/// Tokens (and possibly the user) handed out by login or refresh
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Option<Value>,
}

impl TokenGrant {
    /// `None` when the reply carries no access token.
    pub fn from_body(body: &Value) -> Option<Self> {
        let inner = envelope(body);
        let access_token = non_empty_str(inner.get("access_token"))?;
        let refresh_token = non_empty_str(inner.get("refresh_token"));
        let user = [body.get("user"), inner.get("user")]
            .into_iter()
            .flatten()
            .find(|user| user.is_object())
            .cloned();
        Some(Self {
            access_token,
            refresh_token,
            user,
        })
    }

    /// `user.name`, else `user.user_metadata.display_name`
    pub fn display_name(&self) -> Option<String> {
        let user = self.user.as_ref()?;
        non_empty_str(user.get("name")).or_else(|| {
            non_empty_str(
                user.get("user_metadata")
                    .and_then(|meta| meta.get("display_name")),
            )
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
