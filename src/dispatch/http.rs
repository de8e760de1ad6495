use std::time::{Duration, Instant};

use reqwest::{Client, Url};

use crate::dispatch::{GenerationRequest, PdfApi, RawReply};
use crate::error::PeriwatchError;

/// Max body accepted from the service. Documents are the large case.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024; // 64MB

/// reqwest-backed transport. Every call carries the bearer token and runs
/// under a deadline; expiry surfaces as `PeriwatchError::Timeout`.
pub struct HttpApi {
    client: Client,
    base_url: Url,
    auth_token: String,
    request_timeout: Duration,
}

impl HttpApi {
    pub fn new(
        base_url: &str,
        auth_token: &str,
        request_timeout: Duration,
    ) -> Result<Self, PeriwatchError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|e| PeriwatchError::Config(format!("invalid base URL {trimmed:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PeriwatchError::Config(format!(
                "base URL {trimmed:?} cannot carry a path"
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            base_url,
            auth_token: auth_token.to_string(),
            request_timeout,
        })
    }

    /// `{base}/{segments..}/` with each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<RawReply, PeriwatchError> {
        let start = Instant::now();
        let request = builder.bearer_auth(&self.auth_token);

        tokio::time::timeout(timeout, async {
            let response = request.send().await.map_err(PeriwatchError::Transport)?;
            read_reply(response).await
        })
        .await
        .map_err(|_| PeriwatchError::Timeout(start.elapsed().as_millis() as u64))?
    }
}

async fn read_reply(response: reqwest::Response) -> Result<RawReply, PeriwatchError> {
    let status = response.status().as_u16();

    if let Some(len) = response.content_length()
        && len as usize > MAX_RESPONSE_BYTES
    {
        return Err(PeriwatchError::SchemaParse(format!(
            "response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"
        )));
    }

    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = response.bytes().await?;
    if body.len() > MAX_RESPONSE_BYTES {
        return Err(PeriwatchError::SchemaParse(format!(
            "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
            body.len()
        )));
    }

    Ok(RawReply {
        status,
        headers,
        body: body.to_vec(),
    })
}

impl PdfApi for HttpApi {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawReply, PeriwatchError> {
        let url = self.endpoint(&["api", "generate-pdf"]);
        tracing::debug!(title = request.title, "requesting PDF generation");

        // The server holds the connection for up to `timeout_secs` before
        // answering partial, so the deadline covers that wait too.
        let deadline = self.request_timeout + Duration::from_secs(u64::from(request.timeout_secs));
        let builder = self.client.get(url).query(&request.query_params());
        self.send(builder, deadline).await
    }

    async fn task_status(&self, task_id: &str) -> Result<RawReply, PeriwatchError> {
        let url = self.endpoint(&["api", "task-status", task_id]);
        self.send(self.client.get(url), self.request_timeout).await
    }

    async fn cleanup_tasks(&self, hours: u32) -> Result<RawReply, PeriwatchError> {
        let url = self.endpoint(&["api", "cleanup-tasks"]);
        let body = serde_json::json!({ "hours": hours });
        self.send(self.client.post(url).json(&body), self.request_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpApi {
        HttpApi::new(base, "secret", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let a = api("http://localhost:8000/");
        assert_eq!(
            a.endpoint(&["api", "generate-pdf"]).as_str(),
            "http://localhost:8000/api/generate-pdf/"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let a = api("https://example.com/periwatch");
        assert_eq!(
            a.endpoint(&["api", "task-status", "t1"]).as_str(),
            "https://example.com/periwatch/api/task-status/t1/"
        );
    }

    #[test]
    fn endpoint_encodes_task_id() {
        let a = api("http://localhost:8000");
        let url = a.endpoint(&["api", "task-status", "a/b c"]);
        assert_eq!(url.path(), "/api/task-status/a%2Fb%20c/");
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = HttpApi::new("not a url", "t", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, PeriwatchError::Config(_)));
    }
}
