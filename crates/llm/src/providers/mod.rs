//! LLM provider implementations.

mod gemini;
mod ollama;

pub use gemini::{GeminiClient, DEFAULT_GEMINI_URL};
pub use ollama::{OllamaClient, DEFAULT_OLLAMA_URL};

use docqa_core::AppError;
use reqwest::StatusCode;

/// Map a non-success HTTP status to a transient or rejected error.
///
/// Timeouts, rate limits and server errors are worth retrying; every other
/// status means the request itself was refused.
pub fn classify_http_failure(provider: &str, status: StatusCode, body: &str) -> AppError {
    let message = format!("{} API error ({}): {}", provider, status, body.trim());

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        AppError::LlmTransient(message)
    } else {
        AppError::LlmRejected(message)
    }
}

/// Map a transport error from reqwest.
pub fn classify_send_failure(provider: &str, err: reqwest::Error) -> AppError {
    AppError::LlmTransient(format!("Failed to send request to {}: {}", provider, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = classify_http_failure("gemini", status, "busy");
            assert!(err.is_retryable(), "{} should be transient", status);
        }
    }

    #[test]
    fn test_client_errors_are_rejected() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::FORBIDDEN, StatusCode::NOT_FOUND] {
            let err = classify_http_failure("ollama", status, "nope");
            assert!(matches!(err, AppError::LlmRejected(_)));
        }
    }
}
