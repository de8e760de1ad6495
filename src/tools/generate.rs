use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dispatch::{DEFAULT_TIMEOUT_SECS, DEFAULT_TITLE, GenerationRequest};
use crate::progress::ProgressEvent;

/// Request a PDF report.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GeneratePdfRequest {
    /// Report title; also the download file name (defaults to "Periwatch Report").
    pub title: Option<String>,
    /// Email address that receives the full report when generation continues in the background.
    pub email: String,
    /// Ticker symbol to report on (optional).
    pub ticker: Option<String>,
    /// Company name to report on (optional).
    pub company: Option<String>,
    /// Seconds the service waits for a complete report before returning a partial one (default: 30).
    pub timeout: Option<u32>,
    /// Save a returned document to the configured output directory (default: true).
    pub save: Option<bool>,
}

impl GeneratePdfRequest {
    pub fn to_generation_request(&self) -> GenerationRequest {
        GenerationRequest {
            title: self
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            recipient_email: self.email.trim().to_string(),
            ticker: self.ticker.clone(),
            company: self.company.clone(),
            timeout_secs: self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn save(&self) -> bool {
        self.save.unwrap_or(true)
    }
}

/// JSON payload returned by the `generate_pdf` tool.
#[derive(Debug, Serialize)]
pub struct GeneratePdfResponse {
    pub status: String,
    pub task_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<String>,
    pub document_bytes: usize,
    /// True when a background monitor keeps polling after this response.
    pub monitoring: bool,
    pub progress: Vec<ProgressEvent>,
}
