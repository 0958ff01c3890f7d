use serde::{Deserialize, Serialize};

use crate::SemanticError;

/// Runtime configuration describing which embedding provider to use.
///
/// # Example
/// ```no_run
/// use semantic::{build_embedder, SemanticConfig};
///
/// let cfg = SemanticConfig {
///     mode: "api".into(),
///     model_name: "text-embedding-3-small".into(),
///     api_url: Some("https://api.openai.com/v1/embeddings".into()),
///     api_auth_header: Some("Bearer sk-xxx".into()),
///     api_provider: Some("openai".into()),
///     ..Default::default()
/// };
///
/// let _embedder = build_embedder(&cfg).unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemanticConfig {
    /// Provider selector: `"hash"` (local deterministic feature hashing) or `"api"` (remote HTTP).
    pub mode: String,
    /// Model label. API mode records it in index provenance as is; hash
    /// mode records `hash-fx:{model_name}:{dimension}`.
    pub model_name: String,
    /// Output dimension of the hashing embedder. Ignored in api mode.
    pub dimension: usize,
    /// API inference endpoint when [`mode`](Self::mode) is `"api"`.
    pub api_url: Option<String>,
    /// Authorization header (e.g., `"Bearer hf_xxx"`).
    pub api_auth_header: Option<String>,
    /// Remote provider hint: `"hf"`, `"openai"`, or `"custom"` (default).
    pub api_provider: Option<String>,
    /// Overall API timeout in seconds.
    pub api_timeout_secs: Option<u64>,
    /// Capacity of the per-text LRU embedding cache. `0` disables it.
    pub cache_capacity: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            mode: "hash".into(),
            model_name: "all-MiniLM-L6-v2".into(),
            dimension: 384,
            api_url: None,
            api_auth_header: None,
            api_provider: None,
            api_timeout_secs: Some(30),
            cache_capacity: 1024,
        }
    }
}

impl SemanticConfig {
    pub fn validate(&self) -> Result<(), SemanticError> {
        match self.mode.as_str() {
            "hash" => {
                if self.dimension == 0 {
                    return Err(SemanticError::InvalidConfig(
                        "dimension must be greater than 0".into(),
                    ));
                }
            }
            "api" => {
                if self.api_url.as_deref().is_none_or(str::is_empty) {
                    return Err(SemanticError::InvalidConfig(
                        "api_url is required for api mode".into(),
                    ));
                }
            }
            other => {
                return Err(SemanticError::InvalidConfig(format!(
                    "unknown embedding mode '{other}' (expected 'hash' or 'api')"
                )))
            }
        }
        if self.model_name.trim().is_empty() {
            return Err(SemanticError::InvalidConfig(
                "model_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let cfg = SemanticConfig::default();
        assert_eq!(cfg.mode, "hash");
        assert_eq!(cfg.model_name, "all-MiniLM-L6-v2");
        assert_eq!(cfg.dimension, 384);
        assert!(cfg.api_url.is_none());
        assert_eq!(cfg.api_timeout_secs, Some(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn api_mode_requires_url() {
        let cfg = SemanticConfig {
            mode: "api".into(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("api_url"));
    }

    #[test]
    fn unknown_mode_rejected() {
        let cfg = SemanticConfig {
            mode: "onnx".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: SemanticConfig = serde_json::from_str(r#"{"dimension": 64}"#).unwrap();
        assert_eq!(cfg.dimension, 64);
        assert_eq!(cfg.mode, "hash");
    }
}
