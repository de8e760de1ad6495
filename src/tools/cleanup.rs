use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::DEFAULT_CLEANUP_HOURS;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CleanupTasksRequest {
    /// Drop background tasks older than this many hours (default: 24).
    pub hours: Option<u32>,
}

impl CleanupTasksRequest {
    pub fn hours(&self) -> u32 {
        self.hours.unwrap_or(DEFAULT_CLEANUP_HOURS)
    }
}
