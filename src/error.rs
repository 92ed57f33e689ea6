//! Error handling for cookie-sync

use thiserror::Error;

/// Main error type for cookie-sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Browser cookie error: {0}")]
    BrowserCookie(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("No cookies found")]
    NoCookiesFound,

    #[error("No credential found")]
    NoCredentialFound,

    #[error("AUTH_EXPIRED")]
    AuthExpired,

    /// Refresh failed but the stored session was kept
    #[error("Token refresh failed")]
    RefreshFailed,

    /// A sync run that ended in the error state
    #[error("{0}")]
    SyncFailed(String),

    /// Non-2xx answer from the backend, carrying its message or `HTTP <status>`.
    #[error("{message}")]
    Api { status: u16, message: String },
}

/// Result type alias for cookie-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
