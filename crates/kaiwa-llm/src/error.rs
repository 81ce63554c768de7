use thiserror::Error;

/// Failure modes of one LLM call.
///
/// The split matters to callers: `RetryableUpstream` is worth a bounded
/// retry with backoff, `Permanent` is not, and `Canceled` means the caller
/// itself asked us to stop.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network failure, timeout, 429 or 5xx. Same request may succeed on
    /// retry.
    #[error("upstream request failed: {0}")]
    RetryableUpstream(String),

    /// Auth failure or any other 4xx. Retrying the same request cannot
    /// help.
    #[error("upstream rejected request: {0}")]
    Permanent(String),

    /// The response body did not match the chat-completions shape.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// The caller signaled cancellation; chunks emitted so far are valid.
    #[error("call canceled")]
    Canceled,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RetryableUpstream(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            LlmError::RetryableUpstream(err.to_string())
        } else {
            LlmError::Permanent(err.to_string())
        }
    }
}

/// Map a non-success HTTP status to an error kind.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> LlmError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
    if status.is_server_error() || status.as_u16() == 429 || status.as_u16() == 408 {
        LlmError::RetryableUpstream(detail)
    } else {
        LlmError::Permanent(detail)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn server_errors_are_retryable() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "bad key").is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_retryable());
    }
}
