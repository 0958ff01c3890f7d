use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::GecError;

/// One correction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    /// Sentence to correct.
    pub input: String,
    /// Number of retrieved examples; falls back to `retrieval.top_k`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Whether to retrieve examples; falls back to `retrieval.enabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_retrieval: Option<bool>,
}

impl CorrectionRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            top_k: None,
            use_retrieval: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_retrieval(mut self, enabled: bool) -> Self {
        self.use_retrieval = Some(enabled);
        self
    }

    pub fn validate(&self) -> Result<(), GecError> {
        if self.input.trim().is_empty() {
            return Err(GecError::InvalidRequest("input must not be empty".into()));
        }
        Ok(())
    }
}

/// A structured correction. Stored as cache metadata and returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub input: String,
    pub reasoning: String,
    pub correction: String,
    #[serde(default)]
    pub error_type: Option<String>,
}

impl CorrectionResult {
    /// Shape contract for a result handed back to a caller.
    pub fn validate(&self) -> Result<(), GecError> {
        if self.input.trim().is_empty() {
            return Err(GecError::ResultValidation("input is empty".into()));
        }
        if self.correction.trim().is_empty() {
            return Err(GecError::ResultValidation("correction is empty".into()));
        }
        if let Some(error_type) = &self.error_type {
            if error_type.trim().is_empty() {
                return Err(GecError::ResultValidation(
                    "error_type is present but blank".into(),
                ));
            }
        }
        Ok(())
    }
}

/// A curated example in the support index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportExample {
    pub input: String,
    #[serde(default)]
    pub reasoning: String,
    pub correction: String,
    #[serde(default)]
    pub error_type: Option<String>,
}

impl SupportExample {
    /// Read a support-index metadata record. Older records wrap the example
    /// in a `{"value": ...}` envelope.
    pub fn from_metadata(value: &Value) -> Option<Self> {
        let record = match value.get("value") {
            Some(inner) if inner.is_object() => inner,
            _ => value,
        };
        serde_json::from_value(record.clone()).ok()
    }
}

impl From<&CorrectionResult> for SupportExample {
    fn from(result: &CorrectionResult) -> Self {
        Self {
            input: result.input.clone(),
            reasoning: result.reasoning.clone(),
            correction: result.correction.clone(),
            error_type: result.error_type.clone(),
        }
    }
}

/// Counters exposed by the `metrics` operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub support_count: usize,
}
