//! YAML configuration for the correction pipeline.
//!
//! One file describes the embedding provider, both indexes, the cache
//! policy, retrieval defaults and the generation provider. Every section is
//! optional and falls back to the defaults shown here.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "gec-dev"
//!
//! embedding:
//!   mode: "hash"
//!   model_name: "all-MiniLM-L6-v2"
//!   dimension: 384
//!
//! support_index:
//!   path: "data/support_index.gecidx"
//!   compression: "zstd"
//!   scoring: "matrix"
//!
//! cache:
//!   path: "data/cache_index.gecidx"
//!   threshold: 0.95
//!
//! retrieval:
//!   enabled: true
//!   top_k: 5
//!   oversample: 2
//!   max_prompt_chars: 6000
//!
//! generation:
//!   model: "gpt-4o-mini"
//!   endpoint: "https://api.openai.com/v1"
//!   max_tokens: 256
//! ```
//!
//! Environment variables override the file after it is parsed:
//! `OPENAI_API_KEY`, `GEC_OPENAI_MODEL`, `GEC_EMBEDDING_MODEL`, `GEC_TOP_K`,
//! `GEC_CACHE_THRESHOLD`, `GEC_RETRIEVAL_ENABLED`.

use std::fs;
use std::path::{Path, PathBuf};

use generate::GenerationConfig;
use index::{CompressionCodec, CompressionConfig, IndexConfig, ScoringMode};
use semantic::SemanticConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GecConfig {
    /// Configuration format version
    #[serde(default = "default_config_version")]
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub embedding: SemanticConfig,

    #[serde(default = "default_support_store")]
    pub support_index: StoreYamlConfig,

    #[serde(default)]
    pub cache: CacheYamlConfig,

    #[serde(default)]
    pub retrieval: RetrievalYamlConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

impl GecConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: GecConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// File (or defaults when `path` is `None`), then process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.generation.api_key = Some(key);
        }
        if let Some(model) = lookup("GEC_OPENAI_MODEL") {
            self.generation.model = model;
        }
        if let Some(model) = lookup("GEC_EMBEDDING_MODEL") {
            self.embedding.model_name = model;
        }
        if let Some(raw) = lookup("GEC_TOP_K") {
            self.retrieval.top_k = parse_env("GEC_TOP_K", &raw)?;
        }
        if let Some(raw) = lookup("GEC_CACHE_THRESHOLD") {
            self.cache.threshold = parse_env("GEC_CACHE_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("GEC_RETRIEVAL_ENABLED") {
            self.retrieval.enabled = parse_env("GEC_RETRIEVAL_ENABLED", &raw)?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.embedding
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("embedding: {e}")))?;
        self.support_index.validate("support_index")?;
        self.cache.validate()?;
        self.retrieval.validate()?;
        self.generation
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("generation: {e}")))?;
        Ok(())
    }
}

impl Default for GecConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            name: None,
            embedding: SemanticConfig::default(),
            support_index: default_support_store(),
            cache: CacheYamlConfig::default(),
            retrieval: RetrievalYamlConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Where and how one vector index is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreYamlConfig {
    /// Artifact path. `None` keeps the index in memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    #[serde(default = "default_scoring")]
    pub scoring: String,

    #[serde(default = "default_min_rows_for_matrix")]
    pub min_rows_for_matrix: usize,

    #[serde(default)]
    pub reject_model_mismatch: bool,
}

impl StoreYamlConfig {
    fn validate(&self, section: &str) -> Result<(), ConfigLoadError> {
        let valid_codecs = ["zstd", "none"];
        if !valid_codecs.contains(&self.compression.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "{section}.compression must be one of: {valid_codecs:?}"
            )));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(ConfigLoadError::Validation(format!(
                "{section}.compression_level must be within 1..=22"
            )));
        }
        let valid_scoring = ["matrix", "scalar"];
        if !valid_scoring.contains(&self.scoring.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "{section}.scoring must be one of: {valid_scoring:?}"
            )));
        }
        Ok(())
    }

    pub fn index_config(&self) -> IndexConfig {
        let codec = match self.compression.as_str() {
            "none" => CompressionCodec::None,
            _ => CompressionCodec::Zstd,
        };
        let scoring = match self.scoring.as_str() {
            "scalar" => ScoringMode::Scalar,
            _ => ScoringMode::Matrix,
        };
        IndexConfig::new()
            .with_compression(CompressionConfig::new(codec, self.compression_level))
            .with_scoring(scoring)
            .with_min_rows_for_matrix(self.min_rows_for_matrix)
            .with_reject_model_mismatch(self.reject_model_mismatch)
    }
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            path: None,
            compression: default_compression(),
            compression_level: default_compression_level(),
            scoring: default_scoring(),
            min_rows_for_matrix: default_min_rows_for_matrix(),
            reject_model_mismatch: false,
        }
    }
}

/// Similarity cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheYamlConfig {
    /// Cache artifact path. `None` keeps the cache in memory only.
    #[serde(default = "default_cache_path")]
    pub path: Option<PathBuf>,

    /// Minimum cosine similarity for a hit.
    #[serde(default = "default_cache_threshold")]
    pub threshold: f32,

    /// Log a warning once the cache holds this many entries. `0` disables it.
    #[serde(default = "default_warn_entries")]
    pub warn_entries: usize,

    #[serde(default = "default_compression")]
    pub compression: String,
}

impl CacheYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(ConfigLoadError::Validation(
                "cache.threshold must be within -1.0..=1.0".to_string(),
            ));
        }
        let valid_codecs = ["zstd", "none"];
        if !valid_codecs.contains(&self.compression.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "cache.compression must be one of: {valid_codecs:?}"
            )));
        }
        Ok(())
    }

    pub fn index_config(&self) -> IndexConfig {
        let codec = match self.compression.as_str() {
            "none" => CompressionCodec::None,
            _ => CompressionCodec::Zstd,
        };
        IndexConfig::new().with_compression(CompressionConfig::default().with_codec(codec))
    }
}

impl Default for CacheYamlConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            threshold: default_cache_threshold(),
            warn_entries: default_warn_entries(),
            compression: default_compression(),
        }
    }
}

/// Retrieval and prompt-assembly defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalYamlConfig {
    #[serde(default = "true_value")]
    pub enabled: bool,

    /// Examples per prompt when the request does not say.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidates fetched per requested example, so the stride has room to spread.
    #[serde(default = "default_oversample")]
    pub oversample: usize,

    /// Character budget for the whole prompt.
    #[serde(default)]
    pub max_prompt_chars: Option<usize>,

    /// Fill a missing `error_type` with the rule-based classifier.
    #[serde(default)]
    pub infer_error_type: bool,
}

impl RetrievalYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.oversample == 0 {
            return Err(ConfigLoadError::Validation(
                "retrieval.oversample must be >= 1".to_string(),
            ));
        }
        if self.top_k > 64 {
            return Err(ConfigLoadError::Validation(
                "retrieval.top_k must be <= 64".to_string(),
            ));
        }
        if self.max_prompt_chars == Some(0) {
            return Err(ConfigLoadError::Validation(
                "retrieval.max_prompt_chars must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetrievalYamlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            oversample: default_oversample(),
            max_prompt_chars: None,
            infer_error_type: false,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigLoadError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigLoadError::Validation(format!("{key}={raw:?} is not valid")))
}

fn default_config_version() -> String {
    "1.0".to_string()
}
fn true_value() -> bool {
    true
}
fn default_compression() -> String {
    "zstd".to_string()
}
fn default_compression_level() -> i32 {
    3
}
fn default_scoring() -> String {
    "matrix".to_string()
}
fn default_min_rows_for_matrix() -> usize {
    64
}
fn default_support_store() -> StoreYamlConfig {
    StoreYamlConfig {
        path: Some(PathBuf::from("data/support_index.gecidx")),
        ..StoreYamlConfig::default()
    }
}
fn default_cache_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/cache_index.gecidx"))
}
fn default_cache_threshold() -> f32 {
    0.95
}
fn default_warn_entries() -> usize {
    100_000
}
fn default_top_k() -> usize {
    5
}
fn default_oversample() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = GecConfig::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.retrieval.enabled);
        assert_eq!(config.cache.threshold, 0.95);
        assert_eq!(config.embedding.model_name, "all-MiniLM-L6-v2");
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "test config"
embedding:
  dimension: 64
support_index:
  path: "/tmp/support.gecidx"
  scoring: "scalar"
cache:
  path: ~
  threshold: 0.9
retrieval:
  top_k: 3
  max_prompt_chars: 4000
"#;

        let config = GecConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("test config"));
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.mode, "hash");
        assert!(config.cache.path.is_none());
        assert_eq!(config.cache.threshold, 0.9);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.oversample, 2);
        assert_eq!(config.retrieval.max_prompt_chars, Some(4000));
        assert_eq!(
            config.support_index.index_config().scoring,
            ScoringMode::Scalar
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"version: \"1\"\n").unwrap();

        let config = GecConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.version, "1");
    }

    #[test]
    fn test_unsupported_version() {
        let err = GecConfig::from_yaml("version: \"2.0\"\n").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(_)));
    }

    #[test]
    fn test_section_validation() {
        let bad_codec = "support_index:\n  compression: \"lz4\"\n";
        let err = GecConfig::from_yaml(bad_codec).unwrap_err();
        assert!(err.to_string().contains("support_index.compression"));

        let bad_threshold = "cache:\n  threshold: 1.5\n";
        assert!(GecConfig::from_yaml(bad_threshold).is_err());

        let bad_embedding = "embedding:\n  mode: \"api\"\n";
        let err = GecConfig::from_yaml(bad_embedding).unwrap_err();
        assert!(err.to_string().contains("embedding"));
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("GEC_TOP_K", "7"),
            ("GEC_CACHE_THRESHOLD", "0.8"),
            ("GEC_RETRIEVAL_ENABLED", "false"),
            ("GEC_EMBEDDING_MODEL", "bge-small"),
        ]);
        let mut config = GecConfig::default();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.generation.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.retrieval.top_k, 7);
        assert_eq!(config.cache.threshold, 0.8);
        assert!(!config.retrieval.enabled);
        assert_eq!(config.embedding.model_name, "bge-small");
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut config = GecConfig::default();
        let err = config
            .apply_env_from(|k| (k == "GEC_TOP_K").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("GEC_TOP_K"));
    }
}
