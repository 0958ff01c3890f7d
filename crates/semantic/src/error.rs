use thiserror::Error;

/// Errors surfaced by embedding providers.
#[derive(Debug, Error, Clone)]
pub enum SemanticError {
    /// Configuration is inconsistent (e.g., api mode without an endpoint).
    #[error("invalid semantic config: {0}")]
    InvalidConfig(String),
    /// The provider could not be reached or answered with a non-success status.
    #[error("embedding request failed: {0}")]
    Request(String),
    /// The provider answered, but the payload was not a usable set of vectors.
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),
    /// The provider produced a vector that cannot be normalized.
    #[error("degenerate embedding for input {index}: zero norm")]
    ZeroVector { index: usize },
}
