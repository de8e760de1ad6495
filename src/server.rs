use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::config::Config;
use crate::dispatch::GenerationOutcome;
use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::http::HttpApi;
use crate::download::save_document;
use crate::error::PeriwatchError;
use crate::progress::{self, ProgressReceiver};
use crate::response::{ToolMetadata, ToolResponse};
use crate::tools::cleanup::CleanupTasksRequest;
use crate::tools::generate::{GeneratePdfRequest, GeneratePdfResponse};
use crate::tools::status::{TaskStatusRequest, TaskStatusResponse};

#[derive(Clone)]
pub struct PeriwatchServer {
    dispatcher: Arc<Dispatcher<HttpApi>>,
    output_dir: PathBuf,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PeriwatchServer {
    pub fn new(config: Config) -> Result<Self, PeriwatchError> {
        let api = HttpApi::new(&config.base_url, &config.auth_token, config.request_timeout)?;
        tracing::info!(base_url = config.base_url, "PDF service configured");

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(api, config.poll)),
            output_dir: config.output_dir,
            tool_router: Self::tool_router(),
        })
    }

    #[tool(
        name = "generate_pdf",
        description = "Generate a Periwatch PDF report. Returns the document (saved to disk) when it is ready within `timeout` seconds; otherwise returns a task id and the full report is emailed. Partial and deferred reports keep being monitored in the background."
    )]
    async fn generate_pdf(
        &self,
        Parameters(req): Parameters<GeneratePdfRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let request = req.to_generation_request();

        // Submit-phase events come back in the response; monitor events go
        // to the log.
        let (sender, mut events) = progress::channel();
        let (monitor_sender, monitor_events) = progress::channel();
        let result = self
            .dispatcher
            .submit_with_monitor_progress(&request, &sender, &monitor_sender)
            .await;
        drop(sender);
        drop(monitor_sender);
        let progress = events.drain();

        let submission = match result {
            Ok(s) => s,
            Err(e) => {
                let response = ToolResponse::error(
                    e.user_message(),
                    ToolMetadata {
                        tool_name: "generate_pdf".to_string(),
                        task_id: None,
                        duration_seconds: start.elapsed().as_secs_f64(),
                    },
                );
                return Ok(response.into_call_tool_result());
            }
        };

        let task_id = submission.outcome.task_id().to_string();
        let monitoring = submission.monitor.is_some();
        if monitoring {
            // The monitor stops once its receiver is gone, so keep one alive.
            tokio::spawn(log_progress(task_id.clone(), monitor_events));
        }

        let mut saved_to = None;
        let mut download_name = None;
        if let GenerationOutcome::Synchronous(ref doc) = submission.outcome {
            download_name = Some(doc.download_name.clone());
            if req.save() {
                match save_document(doc, &self.output_dir).await {
                    Ok(path) => saved_to = Some(path.display().to_string()),
                    Err(e) => tracing::warn!(task_id = task_id, "failed to save document: {e}"),
                }
            }
        }

        let payload = GeneratePdfResponse {
            status: submission.outcome.status().as_str().to_string(),
            task_id: task_id.clone(),
            message: submission.outcome.message().to_string(),
            download_name,
            saved_to,
            document_bytes: submission.outcome.document().map_or(0, <[u8]>::len),
            monitoring,
            progress,
        };

        let metadata = ToolMetadata {
            tool_name: "generate_pdf".to_string(),
            task_id: Some(task_id),
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        let response = match serde_json::to_string(&payload) {
            Ok(json) => ToolResponse::success(json, metadata),
            Err(e) => ToolResponse::error(format!("serialization failed: {e}"), metadata),
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "task_status",
        description = "Check the current status of a background PDF task once.",
        annotations(read_only_hint = true)
    )]
    async fn task_status(
        &self,
        Parameters(req): Parameters<TaskStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let task_id = req.task_id.trim().to_string();
        if task_id.is_empty() {
            return Err(McpError::invalid_params("task_id must not be empty", None));
        }

        let metadata = ToolMetadata {
            tool_name: "task_status".to_string(),
            task_id: Some(task_id.clone()),
            duration_seconds: 0.0,
        };

        let response = match self.dispatcher.task_status(&task_id).await {
            Ok(snapshot) => {
                let payload = TaskStatusResponse::new(task_id, snapshot);
                match serde_json::to_string(&payload) {
                    Ok(json) => ToolResponse::success(json, metadata),
                    Err(e) => ToolResponse::error(format!("serialization failed: {e}"), metadata),
                }
            }
            Err(e) => {
                tracing::warn!(task_id = task_id, "status check failed: {e}");
                ToolResponse::error(e.user_message(), metadata)
            }
        };

        Ok(with_duration(response, start).into_call_tool_result())
    }

    #[tool(
        name = "cleanup_tasks",
        description = "Ask the PDF service to remove background tasks older than `hours` (default 24)."
    )]
    async fn cleanup_tasks(
        &self,
        Parameters(req): Parameters<CleanupTasksRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let metadata = ToolMetadata {
            tool_name: "cleanup_tasks".to_string(),
            task_id: None,
            duration_seconds: 0.0,
        };

        let response = match self.dispatcher.cleanup_tasks(req.hours()).await {
            Ok(message) => {
                let json = serde_json::json!({ "message": message }).to_string();
                ToolResponse::success(json, metadata)
            }
            Err(e) => ToolResponse::error(e.user_message(), metadata),
        };

        Ok(with_duration(response, start).into_call_tool_result())
    }
}

fn with_duration(mut response: ToolResponse, start: Instant) -> ToolResponse {
    response.metadata.duration_seconds = start.elapsed().as_secs_f64();
    response
}

/// Forward background monitor progress to the log until the monitor ends.
async fn log_progress(task_id: String, mut events: ProgressReceiver) {
    while let Some(event) = events.recv().await {
        if event.is_failure() {
            tracing::warn!(task_id = task_id, percent = event.percent, "{}", event.message);
        } else {
            tracing::info!(task_id = task_id, percent = event.percent, "{}", event.message);
        }
    }
}

#[tool_handler]
impl ServerHandler for PeriwatchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "periwatch".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Periwatch: PDF report generation.\n\n\
                 1. Call `generate_pdf` with an `email` (plus `title`, `ticker` or `company`).\n\
                    - `completed`: the report is saved locally, see `saved_to`.\n\
                    - `partial`: a partial report is saved; the full one is emailed later.\n\
                    - `processing_background`: nothing to download yet; the report is emailed.\n\
                 2. Call `task_status` with the returned `task_id` to check on background work.\n\
                 3. Call `cleanup_tasks` to drop stale background tasks on the service."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
