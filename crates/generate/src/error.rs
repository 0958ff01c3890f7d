use thiserror::Error;

/// Failures of a generation transport.
///
/// All of these mean "no completion text was obtained". Output that arrives
/// but is unusable is not an error at this layer; callers repair it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// DNS, timeout, connection reset and similar.
    #[error("network error: {0}")]
    Network(String),
    /// Invalid or expired API key.
    #[error("auth error: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    /// The provider answered, but not with a chat completion we can read.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Any other non-success status.
    #[error("provider error: {0}")]
    Provider(String),
    #[error("invalid generation config: {0}")]
    InvalidConfig(String),
}

impl GenerationError {
    /// Whether another transport could plausibly succeed. Credentials and
    /// configuration are shared by both transports, so those are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::Auth(_) | GenerationError::InvalidConfig(_))
    }
}

/// Map an HTTP error status code and body to a [`GenerationError`].
pub(crate) fn map_error_status(status: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => GenerationError::Auth(message),
        429 => GenerationError::RateLimit(message),
        _ => GenerationError::Provider(format!("HTTP {status}: {message}")),
    }
}
