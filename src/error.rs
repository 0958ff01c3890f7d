use index::IndexError;
use thiserror::Error;

use crate::config::ConfigLoadError;
use crate::prompt::PromptError;

/// Everything a correction request can fail with.
#[derive(Debug, Error)]
pub enum GecError {
    /// Index persistence or in-memory invariant failure.
    #[error("storage error: {0}")]
    Storage(String),
    /// The embedding provider failed or returned unusable vectors.
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),
    /// No usable completion and no cached fallback.
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    /// A result about to be returned breaks its shape contract.
    #[error("result validation failed: {0}")]
    ResultValidation(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
}

impl GecError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GecError::Storage(_) => "STORAGE_ERROR",
            GecError::EmbeddingProvider(_) => "EMBEDDING_PROVIDER_ERROR",
            GecError::GenerationFailed(_) => "GENERATION_FAILED",
            GecError::ResultValidation(_) => "RESULT_VALIDATION_ERROR",
            GecError::InvalidRequest(_) => "INVALID_REQUEST",
            GecError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<IndexError> for GecError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Embedding(inner) => GecError::EmbeddingProvider(inner.to_string()),
            IndexError::InvalidInput(msg) => GecError::Storage(format!("invalid index input: {msg}")),
            other => GecError::Storage(other.to_string()),
        }
    }
}

impl From<PromptError> for GecError {
    fn from(e: PromptError) -> Self {
        GecError::InvalidRequest(e.to_string())
    }
}
