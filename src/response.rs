use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// JSON envelope every tool returns as its single text content.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: &'static str,
    pub content: String,
    pub content_type: &'static str,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Serialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(serialize_with = "serialize_finite_f64")]
    pub duration_seconds: f64,
}

/// Serialize f64, clamping non-finite values (NaN, Inf) to 0.0.
fn serialize_finite_f64<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(if v.is_finite() { *v } else { 0.0 })
}

impl ToolResponse {
    pub fn success(content: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "success",
            content,
            content_type: "json",
            metadata,
        }
    }

    pub fn error(message: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "error",
            content: message,
            content_type: "text",
            metadata,
        }
    }

    /// Convert to MCP CallToolResult. Failures are reported in the payload
    /// (`"status": "error"`), not at the transport level.
    pub fn into_call_tool_result(self) -> CallToolResult {
        match serde_json::to_string(&self) {
            Ok(json) => CallToolResult::success(vec![Content::text(json)]),
            Err(e) => {
                let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
                CallToolResult::success(vec![Content::text(format!(
                    r#"{{"status":"error","content":"serialization failed: {escaped}","content_type":"text","metadata":{{}}}}"#
                ))])
            }
        }
    }
}
