use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::status::TaskStatusSnapshot;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskStatusRequest {
    /// Task identifier returned by `generate_pdf`.
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: String,
    pub terminal: bool,
    pub progress_message: &'static str,
    pub progress_percent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskStatusResponse {
    pub fn new(task_id: String, snapshot: TaskStatusSnapshot) -> Self {
        Self {
            task_id,
            status: snapshot.status.as_str().to_string(),
            terminal: snapshot.status.is_terminal(),
            progress_message: snapshot.status.progress_message(),
            progress_percent: snapshot.status.progress_percent(),
            error: snapshot.error_detail,
        }
    }
}
