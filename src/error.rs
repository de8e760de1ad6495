use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeriwatchError {
    /// Required input missing. Raised before any network call.
    #[error("{0}")]
    Validation(String),

    /// Non-success reply to the generation request.
    #[error("{detail}")]
    Request { status: u16, detail: String },

    /// A status poll failed. Terminal for the monitor, never retried.
    #[error("{detail}")]
    StatusQuery { status: Option<u16>, detail: String },

    /// The server reported the background task as failed.
    #[error("{0}")]
    TaskFailed(String),

    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl PeriwatchError {
    /// HTTP status carried by the error, when the server produced one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            Self::StatusQuery { status, .. } => *status,
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Produce a sanitized error message safe for returning to MCP clients.
    /// Does not leak internal URLs or connection details.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Request { detail, .. } => format!("PDF request rejected: {detail}"),
            Self::StatusQuery { detail, .. } => format!("status check failed: {detail}"),
            Self::TaskFailed(detail) => format!("PDF generation failed: {detail}"),
            Self::Transport(_) => "request to PDF service failed".to_string(),
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::SchemaParse(_) => "failed to parse PDF service response".to_string(),
            Self::Cleanup(msg) => format!("Cleanup failed: {msg}"),
            Self::Config(msg) => format!("configuration error: {msg}"),
            Self::Io(e) => format!("failed to write document: {}", e.kind()),
            Self::Other(msg) => msg.clone(),
        }
    }
}
