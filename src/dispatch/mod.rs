pub mod async_poll;
pub mod dispatcher;
pub mod http;

use std::future::Future;

use crate::error::PeriwatchError;
use crate::status::TaskStatus;

pub const DEFAULT_TITLE: &str = "Periwatch Report";
pub const DEFAULT_TIMEOUT_SECS: u32 = 30;
pub const DEFAULT_CLEANUP_HOURS: u32 = 24;

/// Response header carrying `completed` or `partial` on a synchronous reply.
pub const PDF_STATUS_HEADER: &str = "x-pdf-status";
pub const TASK_ID_HEADER: &str = "x-task-id";
pub const MESSAGE_HEADER: &str = "x-message";

/// A document-generation request. Immutable once submitted.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub title: String,
    pub recipient_email: String,
    pub ticker: Option<String>,
    pub company: Option<String>,
    /// Seconds the server waits for a complete document before going partial.
    pub timeout_secs: u32,
}

impl GenerationRequest {
    pub fn new(recipient_email: impl Into<String>) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            recipient_email: recipient_email.into(),
            ticker: None,
            company: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Query parameters for the generation endpoint. Empty optional fields
    /// are left out.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("title", self.title.clone()),
            ("email", self.recipient_email.clone()),
            ("timeout", self.timeout_secs.to_string()),
        ];
        if let Some(ticker) = self.ticker.as_deref().filter(|t| !t.is_empty()) {
            params.push(("ticker", ticker.to_string()));
        }
        if let Some(company) = self.company.as_deref().filter(|c| !c.is_empty()) {
            params.push(("company", company.to_string()));
        }
        params
    }
}

/// Which kind of document a synchronous reply carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentStatus {
    Completed,
    Partial,
}

/// Document returned in the same response as the request.
#[derive(Clone, Debug)]
pub struct SynchronousResult {
    pub status: DocumentStatus,
    pub task_id: String,
    pub message: String,
    pub document: Vec<u8>,
    pub download_name: String,
}

/// Request accepted; the document is generated in the background and
/// delivered by email.
#[derive(Clone, Debug)]
pub struct DeferredResult {
    pub task_id: String,
    pub message: String,
}

/// Only the synchronous variant can carry a document.
#[derive(Clone, Debug)]
pub enum GenerationOutcome {
    Synchronous(SynchronousResult),
    Deferred(DeferredResult),
}

impl GenerationOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Synchronous(r) => match r.status {
                DocumentStatus::Completed => TaskStatus::Completed,
                DocumentStatus::Partial => TaskStatus::Partial,
            },
            Self::Deferred(_) => TaskStatus::ProcessingBackground,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Synchronous(r) => &r.task_id,
            Self::Deferred(r) => &r.task_id,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Synchronous(r) => &r.message,
            Self::Deferred(r) => &r.message,
        }
    }

    pub fn document(&self) -> Option<&[u8]> {
        match self {
            Self::Synchronous(r) => Some(&r.document),
            Self::Deferred(_) => None,
        }
    }
}

/// Raw HTTP reply handed from the transport to the state machine.
/// Header names are stored lowercase.
#[derive(Clone, Debug, Default)]
pub struct RawReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam for the PDF service. `HttpApi` talks to the real
/// service; tests substitute an in-memory implementation.
///
/// Implementations return any HTTP status as `Ok`; `Err` is reserved for
/// transport failures (connect errors, deadline expiry).
pub trait PdfApi: Send + Sync + 'static {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<RawReply, PeriwatchError>> + Send;

    fn task_status(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<RawReply, PeriwatchError>> + Send;

    fn cleanup_tasks(
        &self,
        hours: u32,
    ) -> impl Future<Output = Result<RawReply, PeriwatchError>> + Send;
}
