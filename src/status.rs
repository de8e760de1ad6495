//! Task lifecycle states and the display table that maps them to progress.

use serde::Deserialize;

use crate::error::PeriwatchError;
use crate::progress::ProgressEvent;

/// Lifecycle of a server-side generation task.
///
/// `ProcessingBackground` is the same state whether it comes from the
/// deferred generation reply or from a later status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Completed,
    Partial,
    ProcessingBackground,
    CompletedAndSent,
    Failed,
    /// Status string the client does not recognise. Treated as non-terminal.
    Unknown(String),
}

impl TaskStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "partial" => Self::Partial,
            "processing_background" => Self::ProcessingBackground,
            "completed_and_sent" => Self::CompletedAndSent,
            "failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::ProcessingBackground => "processing_background",
            Self::CompletedAndSent => "completed_and_sent",
            Self::Failed => "failed",
            Self::Unknown(s) => s,
        }
    }

    /// No further polling is meaningful after a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CompletedAndSent | Self::Failed)
    }

    /// Display message for this status.
    pub fn progress_message(&self) -> &'static str {
        match self {
            Self::Running => "Generating PDF...",
            Self::Completed => "PDF completed",
            Self::Partial => "PDF partially generated",
            Self::ProcessingBackground => "Generating full PDF in background...",
            Self::CompletedAndSent => "PDF completed and sent to email",
            Self::Failed => "PDF generation failed",
            Self::Unknown(_) => "Processing...",
        }
    }

    /// Display percentage for this status; -1 marks failure.
    pub fn progress_percent(&self) -> i32 {
        match self {
            Self::Running => 25,
            Self::Completed => 100,
            Self::Partial => 50,
            Self::ProcessingBackground => 75,
            Self::CompletedAndSent => 100,
            Self::Failed => -1,
            Self::Unknown(_) => 0,
        }
    }

    pub fn progress(&self) -> ProgressEvent {
        ProgressEvent::new(self.progress_message(), self.progress_percent())
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// One status poll result. Fetched fresh on each poll, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusSnapshot {
    pub status: TaskStatus,
    /// Server-side error text. Only meaningful when `status` is `Failed`.
    pub error_detail: Option<String>,
}

impl TaskStatusSnapshot {
    pub fn from_json(body: &[u8]) -> Result<Self, PeriwatchError> {
        let parsed: StatusBody = serde_json::from_slice(body)
            .map_err(|e| PeriwatchError::SchemaParse(format!("task status response: {e}")))?;
        let status = TaskStatus::parse(&parsed.status);
        let error_detail = match status {
            TaskStatus::Failed => parsed.error.filter(|e| !e.is_empty()),
            _ => None,
        };
        Ok(Self {
            status,
            error_detail,
        })
    }
}
