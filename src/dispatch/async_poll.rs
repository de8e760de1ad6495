use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PollConfig;
use crate::dispatch::PdfApi;
use crate::error::PeriwatchError;
use crate::progress::{ProgressEvent, ProgressSender};
use crate::status::{TaskStatus, TaskStatusSnapshot};

/// How a monitor run ended, when it did not end in an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The server reported `completed_and_sent`.
    Completed(TaskStatusSnapshot),
    /// Check limit exhausted without a terminal status. Not an error: the
    /// document is still delivered by email.
    TimedOut { checks: u32 },
    /// Cancelled by token or by the progress receiver going away.
    Cancelled { checks: u32 },
}

/// Per-run polling state. Owned by exactly one monitor invocation.
#[derive(Debug)]
pub struct PollSession {
    pub task_id: String,
    pub checks_performed: u32,
    pub check_limit: u32,
    pub interval: Duration,
}

impl PollSession {
    pub fn new(task_id: &str, poll: &PollConfig) -> Self {
        Self {
            task_id: task_id.to_string(),
            checks_performed: 0,
            check_limit: poll.check_limit,
            interval: poll.interval,
        }
    }

    /// Count another check if the budget allows it. The comparison happens
    /// before the increment, so a session performs `check_limit + 1`
    /// queries in total.
    pub fn try_advance(&mut self) -> bool {
        if self.checks_performed < self.check_limit {
            self.checks_performed += 1;
            true
        } else {
            false
        }
    }
}

/// Fetch and parse one status snapshot. Every failure, including an
/// unparseable body, becomes `StatusQuery`.
pub async fn fetch_status<A: PdfApi>(
    api: &A,
    task_id: &str,
) -> Result<TaskStatusSnapshot, PeriwatchError> {
    let reply = api
        .task_status(task_id)
        .await
        .map_err(|e| PeriwatchError::StatusQuery {
            status: e.http_status(),
            detail: e.to_string(),
        })?;

    if !reply.is_success() {
        return Err(PeriwatchError::StatusQuery {
            status: Some(reply.status),
            detail: format!("HTTP {}", reply.status),
        });
    }

    TaskStatusSnapshot::from_json(&reply.body).map_err(|e| PeriwatchError::StatusQuery {
        status: Some(reply.status),
        detail: e.to_string(),
    })
}

/// Polls one task on a fixed interval until it reaches a terminal status,
/// a query fails, the check limit runs out, or it is cancelled.
pub struct TaskMonitor<A> {
    api: Arc<A>,
    poll: PollConfig,
}

impl<A> Clone for TaskMonitor<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            poll: self.poll,
        }
    }
}

impl<A: PdfApi> TaskMonitor<A> {
    pub fn new(api: Arc<A>, poll: PollConfig) -> Self {
        Self { api, poll }
    }

    pub async fn run(
        &self,
        task_id: &str,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<MonitorOutcome, PeriwatchError> {
        let mut session = PollSession::new(task_id, &self.poll);

        tracing::info!(
            task_id = task_id,
            check_limit = session.check_limit,
            interval_ms = session.interval.as_millis() as u64,
            "monitoring task"
        );

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled(&session)),
                _ = progress.closed() => return Ok(cancelled(&session)),
                r = fetch_status(&*self.api, task_id) => r,
            };

            let snapshot = match result {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(
                        task_id = task_id,
                        checks = session.checks_performed,
                        "status query failed: {e}"
                    );
                    progress.emit(ProgressEvent::monitoring_error(&e));
                    return Err(e);
                }
            };

            tracing::debug!(
                task_id = task_id,
                checks = session.checks_performed,
                status = %snapshot.status,
                "task status"
            );
            progress.emit(snapshot.status.progress());

            match snapshot.status {
                TaskStatus::CompletedAndSent => {
                    tracing::info!(
                        task_id = task_id,
                        checks = session.checks_performed,
                        "task completed and sent"
                    );
                    return Ok(MonitorOutcome::Completed(snapshot));
                }
                TaskStatus::Failed => {
                    let detail = snapshot
                        .error_detail
                        .unwrap_or_else(|| "Task failed".to_string());
                    tracing::warn!(task_id = task_id, "task failed: {detail}");
                    let err = PeriwatchError::TaskFailed(detail);
                    progress.emit(ProgressEvent::monitoring_error(&err));
                    return Err(err);
                }
                _ => {}
            }

            if !session.try_advance() {
                tracing::info!(
                    task_id = task_id,
                    checks = session.checks_performed,
                    "check limit reached, leaving delivery to email"
                );
                progress.emit(ProgressEvent::monitor_timeout());
                return Ok(MonitorOutcome::TimedOut {
                    checks: session.checks_performed,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled(&session)),
                _ = progress.closed() => return Ok(cancelled(&session)),
                _ = tokio::time::sleep(session.interval) => {}
            }
        }
    }

    /// Start a detached monitor. Dropping the returned handle does not stop
    /// it; the outcome stays observable through `progress`.
    pub fn spawn(&self, task_id: &str, progress: ProgressSender) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let monitor = self.clone();
        let id = task_id.to_string();
        let token = cancel.clone();

        let join = tokio::spawn(async move { monitor.run(&id, &progress, &token).await });

        MonitorHandle {
            task_id: task_id.to_string(),
            cancel,
            join,
        }
    }
}

fn cancelled(session: &PollSession) -> MonitorOutcome {
    tracing::info!(
        task_id = session.task_id,
        checks = session.checks_performed,
        "monitoring cancelled"
    );
    MonitorOutcome::Cancelled {
        checks: session.checks_performed,
    }
}

/// Handle to a spawned monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    task_id: String,
    cancel: CancellationToken,
    join: JoinHandle<Result<MonitorOutcome, PeriwatchError>>,
}

impl MonitorHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Stop scheduling polls. The monitor resolves `Cancelled` without
    /// emitting further progress.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> Result<MonitorOutcome, PeriwatchError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(PeriwatchError::Other(format!(
                "monitor for task {} panicked: {e}",
                self.task_id
            ))),
        }
    }
}
