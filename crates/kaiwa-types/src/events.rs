use serde::{Deserialize, Serialize};

/// Events produced by one pipeline turn, in emission order.
///
/// The session server translates these into outbound wire frames; the
/// pipeline itself never touches the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// One incremental piece of assistant text. Carries the chunk only,
    /// never the running concatenation.
    Chunk { content: String },
    /// A user-visible, non-fatal error. The turn may still stream an
    /// answer after this (degraded path).
    Error { code: ErrorCode, message: String },
    /// Terminal event: the assistant turn is complete and persisted (or
    /// persistence failed, in which case `warning` says so).
    Done { warning: Option<String> },
}

/// Closed set of user-visible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    NotInitialized,
    Busy,
    StorageError,
    UpstreamError,
    Timeout,
    Canceled,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotInitialized => "not_initialized",
            ErrorCode::Busy => "busy",
            ErrorCode::StorageError => "storage_error",
            ErrorCode::UpstreamError => "upstream_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Canceled => "canceled",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::NotInitialized).unwrap();
        assert_eq!(json, "\"not_initialized\"");
        assert_eq!(ErrorCode::NotInitialized.as_str(), "not_initialized");
    }
}
