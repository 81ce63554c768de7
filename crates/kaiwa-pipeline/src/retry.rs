use kaiwa_llm::LlmError;
use std::future::Future;
use std::time::Duration;

/// Transient upstream failures get at most this many extra attempts.
pub const MAX_RETRIES: u32 = 2;
/// First backoff delay; doubles per attempt.
pub const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Run an LLM operation, retrying `RetryableUpstream` failures with
/// exponential backoff. Permanent and canceled errors pass straight
/// through.
pub async fn with_backoff<T, F, Fut>(mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < MAX_RETRIES => {
                let delay = BACKOFF_BASE * 2u32.pow(attempt);
                tracing::warn!(%error, attempt, delay_ms = delay.as_millis() as u64, "retrying LLM call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::RetryableUpstream("503".into()))
                } else {
                    Ok("answer")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_two_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::RetryableUpstream("timeout".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Permanent("401".into())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
