//! Output formatting for the CLI

use crate::error::Result;
use crate::model::SyncResult;
use crate::service::{Response, StatusReport};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Writes command results to stdout and diagnostics to stderr
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn write_response(&self, response: &Response) -> Result<()> {
        let rendered = match self.format {
            OutputFormat::Json => to_json_line(response)?,
            OutputFormat::Text => render_response(response),
        };
        self.write(&rendered)
    }

    pub fn write_status(&self, report: &StatusReport) -> Result<()> {
        let rendered = match self.format {
            OutputFormat::Json => to_json_line(report)?,
            OutputFormat::Text => render_status(report),
        };
        self.write(&rendered)
    }

    pub fn write_sync_result(&self, result: &SyncResult) -> Result<()> {
        let rendered = match self.format {
            OutputFormat::Json => to_json_line(result)?,
            OutputFormat::Text => format!("{}\n", render_sync_result(result)),
        };
        self.write(&rendered)
    }

    /// Write content to stdout
    pub fn write(&self, content: &str) -> Result<()> {
        io::stdout().write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn write_error(&self, message: &str) {
        eprintln!("cookie-sync: error: {}", message);
    }
}

fn to_json_line<T: serde::Serialize>(value: &T) -> Result<String> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');
    Ok(rendered)
}

pub(crate) fn render_response(response: &Response) -> String {
    if !response.success {
        return format!(
            "Failed: {}\n",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    let user = response.user.as_ref().and_then(|user| {
        user.get("name")
            .or_else(|| user.get("email"))
            .and_then(|value| value.as_str())
    });
    match user {
        Some(user) => format!("OK ({})\n", user),
        None => "OK\n".to_string(),
    }
}

/// One line: status, time, per-domain counts and the error if any
pub(crate) fn render_sync_result(result: &SyncResult) -> String {
    let counts = result
        .cookie_counts
        .iter()
        .map(|(name, count)| format!("{}={}", name, count))
        .collect::<Vec<_>>()
        .join(", ");
    let mut line = format!(
        "{} at {} ({} cookies",
        result.status,
        crate::model::iso_timestamp(&result.timestamp),
        result.total_cookies()
    );
    if !counts.is_empty() {
        line.push_str(": ");
        line.push_str(&counts);
    }
    line.push(')');
    if let Some(error) = &result.error_message {
        line.push_str(" - ");
        line.push_str(error);
    }
    line
}

pub(crate) fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    if report.logged_in {
        let email = report.user_email.as_deref().unwrap_or("-");
        match report.user_name.as_deref().filter(|name| *name != email) {
            Some(name) => out.push_str(&format!("Logged in:   {} <{}>\n", name, email)),
            None => out.push_str(&format!("Logged in:   {}\n", email)),
        }
    } else {
        out.push_str("Logged in:   no\n");
    }
    out.push_str(&format!(
        "API:         {}\n",
        report.api_base_url.as_deref().unwrap_or("(not configured)")
    ));
    if let Some(id) = &report.credential_id {
        out.push_str(&format!("Credential:  {}\n", id));
    }
    match &report.last_sync {
        Some(result) => out.push_str(&format!("Last sync:   {}\n", render_sync_result(result))),
        None => out.push_str("Last sync:   never\n"),
    }
    if let Some(badge) = &report.badge {
        out.push_str(&format!("Badge:       {}\n", badge));
    }
    out
}
