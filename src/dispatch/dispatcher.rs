use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;

use crate::config::PollConfig;
use crate::dispatch::async_poll::{MonitorHandle, TaskMonitor, fetch_status};
use crate::dispatch::{
    DeferredResult, DocumentStatus, GenerationOutcome, GenerationRequest, MESSAGE_HEADER,
    PDF_STATUS_HEADER, PdfApi, RawReply, SynchronousResult, TASK_ID_HEADER,
};
use crate::error::PeriwatchError;
use crate::progress::{
    BACKGROUND_MESSAGE, COMPLETED_MESSAGE, PARTIAL_MESSAGE, ProgressEvent, ProgressSender,
    STARTING_MESSAGE,
};
use crate::status::TaskStatusSnapshot;

/// HTTP status the service uses for "accepted, continuing in background".
const ACCEPTED: u16 = 202;

#[derive(Deserialize)]
struct AcceptedBody {
    task_id: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

#[derive(Deserialize)]
struct CleanupBody {
    message: String,
}

/// What `submit` produced: the outcome, plus the background monitor when
/// one was started (deferred and partial outcomes).
#[derive(Debug)]
pub struct Submission {
    pub outcome: GenerationOutcome,
    pub monitor: Option<MonitorHandle>,
}

/// Issues generation requests, classifies the immediate reply and hands
/// deferred work to a [`TaskMonitor`].
pub struct Dispatcher<A> {
    api: Arc<A>,
    monitor: TaskMonitor<A>,
}

impl<A: PdfApi> Dispatcher<A> {
    pub fn new(api: A, poll: PollConfig) -> Self {
        Self::with_api(Arc::new(api), poll)
    }

    pub fn with_api(api: Arc<A>, poll: PollConfig) -> Self {
        let monitor = TaskMonitor::new(api.clone(), poll);
        Self { api, monitor }
    }

    /// Submit a generation request.
    ///
    /// Starts at most one detached monitor. Every failure emits a final
    /// `Error: ...` event with percent -1 before it is returned.
    pub async fn submit(
        &self,
        request: &GenerationRequest,
        progress: &ProgressSender,
    ) -> Result<Submission, PeriwatchError> {
        self.submit_with_monitor_progress(request, progress, progress).await
    }

    /// Like [`submit`](Self::submit), but the background monitor reports to
    /// `monitor_progress`, so `progress` sees only the submit phase.
    pub async fn submit_with_monitor_progress(
        &self,
        request: &GenerationRequest,
        progress: &ProgressSender,
        monitor_progress: &ProgressSender,
    ) -> Result<Submission, PeriwatchError> {
        let start = Instant::now();
        let result = self.submit_inner(request, progress, monitor_progress).await;

        match &result {
            Ok(submission) => tracing::info!(
                title = request.title,
                status = %submission.outcome.status(),
                task_id = submission.outcome.task_id(),
                monitoring = submission.monitor.is_some(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "generation request classified"
            ),
            Err(e) => {
                tracing::warn!(title = request.title, "generation request failed: {e}");
                progress.emit(ProgressEvent::submit_error(e));
            }
        }
        result
    }

    async fn submit_inner(
        &self,
        request: &GenerationRequest,
        progress: &ProgressSender,
        monitor_progress: &ProgressSender,
    ) -> Result<Submission, PeriwatchError> {
        if request.recipient_email.trim().is_empty() {
            return Err(PeriwatchError::Validation("Email is required".into()));
        }

        progress.emit(ProgressEvent::new(STARTING_MESSAGE, 0));

        let reply = self.api.generate(request).await?;

        if reply.status == ACCEPTED {
            return self.accept_deferred(&reply, progress, monitor_progress);
        }

        if !reply.is_success() {
            return Err(PeriwatchError::Request {
                status: reply.status,
                detail: error_detail(&reply),
            });
        }

        self.accept_document(request, reply, progress, monitor_progress)
    }

    fn accept_deferred(
        &self,
        reply: &RawReply,
        progress: &ProgressSender,
        monitor_progress: &ProgressSender,
    ) -> Result<Submission, PeriwatchError> {
        let body: AcceptedBody = serde_json::from_slice(&reply.body)
            .map_err(|e| PeriwatchError::SchemaParse(format!("accepted response: {e}")))?;

        progress.emit(ProgressEvent::new(BACKGROUND_MESSAGE, 25));
        let monitor = self.monitor.spawn(&body.task_id, monitor_progress.clone());

        Ok(Submission {
            outcome: GenerationOutcome::Deferred(DeferredResult {
                task_id: body.task_id,
                message: body.message,
            }),
            monitor: Some(monitor),
        })
    }

    fn accept_document(
        &self,
        request: &GenerationRequest,
        reply: RawReply,
        progress: &ProgressSender,
        monitor_progress: &ProgressSender,
    ) -> Result<Submission, PeriwatchError> {
        let status = match reply.header(PDF_STATUS_HEADER) {
            Some("completed") => DocumentStatus::Completed,
            Some("partial") => DocumentStatus::Partial,
            Some(other) => {
                return Err(PeriwatchError::SchemaParse(format!(
                    "unexpected {PDF_STATUS_HEADER}: {other}"
                )));
            }
            None => {
                return Err(PeriwatchError::SchemaParse(format!(
                    "document response missing {PDF_STATUS_HEADER}"
                )));
            }
        };
        let task_id = reply
            .header(TASK_ID_HEADER)
            .unwrap_or_default()
            .to_string();
        let message = reply.header(MESSAGE_HEADER).unwrap_or_default().to_string();

        let (download_name, monitor) = match status {
            DocumentStatus::Completed => {
                progress.emit(ProgressEvent::new(COMPLETED_MESSAGE, 100));
                (format!("{}.pdf", request.title), None)
            }
            DocumentStatus::Partial => {
                progress.emit(ProgressEvent::new(PARTIAL_MESSAGE, 50));
                let monitor = if task_id.is_empty() {
                    tracing::warn!(
                        title = request.title,
                        "partial document has no {TASK_ID_HEADER}, not monitoring"
                    );
                    None
                } else {
                    Some(self.monitor.spawn(&task_id, monitor_progress.clone()))
                };
                (format!("{}_partial.pdf", request.title), monitor)
            }
        };

        Ok(Submission {
            outcome: GenerationOutcome::Synchronous(SynchronousResult {
                status,
                task_id,
                message,
                document: reply.body,
                download_name,
            }),
            monitor,
        })
    }

    /// Single status query, outside any monitor.
    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatusSnapshot, PeriwatchError> {
        fetch_status(&*self.api, task_id).await
    }

    /// Ask the service to drop background tasks older than `hours`.
    pub async fn cleanup_tasks(&self, hours: u32) -> Result<String, PeriwatchError> {
        let reply = self
            .api
            .cleanup_tasks(hours)
            .await
            .map_err(|e| PeriwatchError::Cleanup(e.to_string()))?;

        if !reply.is_success() {
            return Err(PeriwatchError::Cleanup(format!("HTTP {}", reply.status)));
        }

        let body: CleanupBody = serde_json::from_slice(&reply.body)
            .map_err(|e| PeriwatchError::Cleanup(format!("bad response: {e}")))?;
        tracing::info!(hours = hours, "cleanup requested: {}", body.message);
        Ok(body.message)
    }
}

/// `detail` from a JSON error body, else a generic status message.
fn error_detail(reply: &RawReply) -> String {
    serde_json::from_slice::<ErrorBody>(&reply.body)
        .ok()
        .and_then(|b| b.detail)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", reply.status))
}
