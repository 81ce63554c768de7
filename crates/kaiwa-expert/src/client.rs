use crate::sse::{parse_expert_stream, ExpertFrame};
use crate::types::{ConsultRequest, ExpertResult};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const STREAM_QA_PATH: &str = "/sse/stream_qa";

/// Client for the upstream expert service's streaming QA channel.
///
/// Holds a shared `reqwest::Client`; safe to clone across connections.
#[derive(Clone)]
pub struct ExpertClient {
    http_client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    enabled: bool,
}

pub struct ExpertClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    enabled: bool,
}

impl ExpertClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        if !url.is_empty() {
            self.base_url = Some(url.trim_end_matches('/').to_string());
        }
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn build(self) -> ExpertClient {
        ExpertClient {
            http_client: reqwest::Client::new(),
            base_url: self.base_url,
            api_key: self.api_key,
            timeout: self.timeout,
            enabled: self.enabled,
        }
    }
}

impl ExpertClient {
    pub fn builder() -> ExpertClientBuilder {
        ExpertClientBuilder {
            base_url: None,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            enabled: true,
        }
    }

    /// Whether a consultation would actually perform I/O.
    pub fn is_configured(&self) -> bool {
        self.enabled && self.base_url.is_some()
    }

    /// Consult the expert, delivering every content chunk to `on_chunk` in
    /// receive order before returning.
    ///
    /// A single overall deadline bounds the call. On expiry the connection
    /// is dropped and a timeout result is returned; chunks already handed
    /// to `on_chunk` stay delivered.
    pub async fn consult(
        &self,
        request: &ConsultRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> ExpertResult {
        let Some(base_url) = self.base_url.as_deref() else {
            return ExpertResult::not_configured();
        };
        if !self.enabled || request.session_id.is_empty() {
            return ExpertResult::not_configured();
        }

        tracing::info!(
            session_id = %request.session_id,
            agent_type = %request.agent_type,
            "consulting expert"
        );

        let outcome = tokio::time::timeout(
            self.timeout,
            self.stream_answer(base_url, request, on_chunk),
        )
        .await;

        match outcome {
            Err(_) => {
                tracing::warn!(session_id = %request.session_id, "expert consultation timed out");
                ExpertResult::failure("timeout")
            }
            Ok(Err(error)) => {
                tracing::warn!(session_id = %request.session_id, %error, "expert consultation failed");
                ExpertResult::failure(error)
            }
            Ok(Ok(answer)) if answer.is_empty() => ExpertResult::failure("empty answer"),
            Ok(Ok(answer)) => ExpertResult {
                success: true,
                answer: Some(answer),
                confidence: Some(1.0),
                sources: Vec::new(),
                metadata: Some(serde_json::json!({
                    "agent_type": request.agent_type,
                    "session_id": request.session_id,
                    "response_type": "sse_stream",
                })),
                error: None,
            },
        }
    }

    async fn stream_answer(
        &self,
        base_url: &str,
        request: &ConsultRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, String> {
        let mut params: Vec<(&str, String)> = vec![
            ("query", request.query.clone()),
            ("agent_type", request.agent_type.clone()),
            ("session_id", request.session_id.clone()),
        ];
        if let Some(config) = &request.config {
            params.push(("config", config.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        let response = self
            .http_client
            .get(format!("{base_url}{STREAM_QA_PATH}"))
            .query(&params)
            .headers(headers)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let mut frames = Box::pin(parse_expert_stream(response.bytes_stream()));
        let mut answer = String::new();

        while let Some(frame) = frames.next().await {
            match frame.map_err(|e| e.to_string())? {
                ExpertFrame::Content(chunk) => {
                    on_chunk(&chunk);
                    answer.push_str(&chunk);
                }
                ExpertFrame::Done => break,
                ExpertFrame::Error(message) => return Err(message),
            }
        }

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_base_url_skips_without_io() {
        let client = ExpertClient::builder().build();
        let request = ConsultRequest::japan("q", "sess");
        let mut sink = |_: &str| {};
        let result = client.consult(&request, &mut sink).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("not_configured"));
    }

    #[tokio::test]
    async fn empty_session_id_skips_without_io() {
        let client = ExpertClient::builder()
            .base_url("http://localhost:5003")
            .build();
        let request = ConsultRequest::japan("q", "");
        let mut sink = |_: &str| {};
        let result = client.consult(&request, &mut sink).await;
        assert_eq!(result.error.as_deref(), Some("not_configured"));
    }

    #[tokio::test]
    async fn disabled_feature_skips_without_io() {
        let client = ExpertClient::builder()
            .base_url("http://localhost:5003")
            .enabled(false)
            .build();
        assert!(!client.is_configured());
        let request = ConsultRequest::japan("q", "sess");
        let mut sink = |_: &str| {};
        let result = client.consult(&request, &mut sink).await;
        assert_eq!(result.error.as_deref(), Some("not_configured"));
    }

    #[test]
    fn builder_ignores_empty_base_url() {
        let client = ExpertClient::builder().base_url("").build();
        assert!(!client.is_configured());
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let client = ExpertClient::builder()
            .base_url("http://localhost:5003/")
            .build();
        assert_eq!(client.base_url.as_deref(), Some("http://localhost:5003"));
    }
}
