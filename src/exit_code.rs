use crate::error::SyncError;

pub fn exit_code_for_error(err: &SyncError) -> i32 {
    match err {
        SyncError::InvalidUrl(_) => 3,
        SyncError::Config(_) | SyncError::Toml(_) => 2,
        SyncError::NotLoggedIn => 10,
        SyncError::NoCookiesFound => 11,
        SyncError::NoCredentialFound => 12,
        SyncError::AuthExpired => 13,
        SyncError::SyncFailed(_) | SyncError::RefreshFailed => 1,
        SyncError::Api { status, .. } => api_exit_code(*status),
        SyncError::FileNotFound(_) => 37,
        SyncError::Store(_) | SyncError::Io(_) => 23,
        SyncError::Json(_) => 26,
        SyncError::Unsupported(_) => 4,
        SyncError::Http(err) => http_exit_code(err),
        SyncError::BrowserCookie(_) => 43,
    }
}

fn http_exit_code(err: &reqwest::Error) -> i32 {
    if err.is_timeout() {
        return 28;
    }
    if err.is_connect() {
        return 7;
    }
    if err.is_request() {
        return 2;
    }
    43
}

fn api_exit_code(status: u16) -> i32 {
    match status {
        401 | 403 => 13,
        400..=499 => 22,
        _ => 52,
    }
}
