//! Request orchestration.
//!
//! [`CorrectionService`] owns everything a request touches: the support
//! index, the similarity cache, the generator and the prompt assembler. It
//! is built once and shared (usually behind an `Arc`).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use generate::{build_generator, Generator};
use index::VectorIndex;
use metrics::{counter, histogram};

use crate::cache::SimilarityCache;
use crate::classify::classify_error;
use crate::config::{ConfigLoadError, GecConfig};
use crate::prompt::ExampleAssembler;
use crate::repair::{CompletionSource, RepairLoop, RepairSource};
use crate::types::{CorrectionRequest, CorrectionResult, ServiceMetrics, SupportExample};
use crate::GecError;

/// Per-request defaults resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub retrieval_enabled: bool,
    pub top_k: usize,
    /// Candidates fetched per requested example.
    pub oversample: usize,
    pub max_tokens: u32,
    /// Fill a missing `error_type` with [`classify_error`].
    pub infer_error_type: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            retrieval_enabled: true,
            top_k: 5,
            oversample: 2,
            max_tokens: 256,
            infer_error_type: false,
        }
    }
}

impl ServiceSettings {
    pub fn from_config(cfg: &GecConfig) -> Self {
        Self {
            retrieval_enabled: cfg.retrieval.enabled,
            top_k: cfg.retrieval.top_k,
            oversample: cfg.retrieval.oversample.max(1),
            max_tokens: cfg.generation.max_tokens,
            infer_error_type: cfg.retrieval.infer_error_type,
        }
    }
}

pub struct CorrectionService {
    support: Arc<VectorIndex>,
    cache: Arc<SimilarityCache>,
    transport: Transport,
    assembler: ExampleAssembler,
    repair: RepairLoop,
    settings: ServiceSettings,
}

impl CorrectionService {
    pub fn new(
        support: Arc<VectorIndex>,
        cache: Arc<SimilarityCache>,
        generator: Arc<dyn Generator>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            support,
            cache,
            transport: Transport {
                generator,
                max_tokens: settings.max_tokens,
            },
            assembler: ExampleAssembler::default(),
            repair: RepairLoop::new(),
            settings,
        }
    }

    pub fn with_assembler(mut self, assembler: ExampleAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Build every component from `cfg`, loading both index artifacts when
    /// their files exist.
    pub fn from_config(cfg: &GecConfig) -> Result<Self, GecError> {
        let generator = build_generator(&cfg.generation)
            .map_err(|e| ConfigLoadError::Validation(format!("generation: {e}")))?;
        Self::from_config_with_generator(cfg, generator)
    }

    /// Like [`from_config`](Self::from_config) with a caller-supplied generator.
    pub fn from_config_with_generator(
        cfg: &GecConfig,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, GecError> {
        let embedder = semantic::build_embedder(&cfg.embedding)
            .map_err(|e| GecError::EmbeddingProvider(e.to_string()))?;

        let support = VectorIndex::new(Arc::clone(&embedder), cfg.support_index.index_config());
        if let Some(path) = &cfg.support_index.path {
            support.load(path)?;
        }
        let cache_index = VectorIndex::new(embedder, cfg.cache.index_config());
        if let Some(path) = &cfg.cache.path {
            cache_index.load(path)?;
        }
        let cache = SimilarityCache::new(Arc::new(cache_index), cfg.cache.threshold)
            .with_path(cfg.cache.path.clone())
            .with_warn_entries(cfg.cache.warn_entries);

        tracing::info!(
            support_entries = support.len(),
            cache_entries = cache.len(),
            generator = generator.model_name(),
            "correction service ready"
        );

        let assembler = ExampleAssembler::default().with_budget(cfg.retrieval.max_prompt_chars);
        Ok(Self::new(
            Arc::new(support),
            Arc::new(cache),
            generator,
            ServiceSettings::from_config(cfg),
        )
        .with_assembler(assembler))
    }

    pub fn support(&self) -> &Arc<VectorIndex> {
        &self.support
    }

    pub fn cache(&self) -> &Arc<SimilarityCache> {
        &self.cache
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Cache counters and the support index size.
    pub fn metrics(&self) -> ServiceMetrics {
        let (hits, misses, hit_rate) = self.cache.metrics();
        ServiceMetrics {
            hits,
            misses,
            hit_rate,
            support_count: self.support.len(),
        }
    }

    /// Correct one sentence.
    pub async fn correct(&self, request: CorrectionRequest) -> Result<CorrectionResult, GecError> {
        let started = Instant::now();
        let outcome = self.correct_inner(&request).await;
        histogram!("gec_correct_duration_seconds").record(started.elapsed().as_secs_f64());
        let status = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        counter!("gec_corrections_total", "status" => status).increment(1);
        outcome
    }

    async fn correct_inner(&self, request: &CorrectionRequest) -> Result<CorrectionResult, GecError> {
        request.validate()?;
        let input = request.input.as_str();

        if let Some(hit) = self.cache.lookup(input).await? {
            return Ok(hit);
        }

        let use_retrieval = request.use_retrieval.unwrap_or(self.settings.retrieval_enabled);
        let count = request.top_k.unwrap_or(self.settings.top_k);
        let examples = if use_retrieval && count > 0 {
            self.retrieve(input, count).await?
        } else {
            Vec::new()
        };

        let prompt = self.assembler.assemble(input, &examples, count)?;
        tracing::debug!(
            examples = prompt.examples_used,
            truncated = prompt.truncated,
            chars = prompt.text.chars().count(),
            "prompt assembled"
        );

        let outcome = match self.transport.complete(&prompt.text).await {
            Ok(raw) => self
                .repair
                .run(&prompt.text, input, raw, &self.transport)
                .await,
            Err(e) => {
                tracing::warn!(error = %e, "no completion obtained");
                let reason = format!("no completion obtained: {e}");
                return self.degraded(input, &reason).await;
            }
        };

        if outcome.source == RepairSource::Failed {
            let reason = format!("no usable completion after {} attempt(s)", outcome.attempts);
            return self.degraded(input, &reason).await;
        }
        tracing::debug!(attempts = outcome.attempts, source = ?outcome.source, "completion repaired");
        let mut result = outcome.result;

        result.input = request.input.clone();
        if self.settings.infer_error_type && result.error_type.is_none() {
            result.error_type = classify_error(&result.input, &result.correction).map(str::to_string);
        }
        result.validate()?;

        if let Err(e) = self.cache.upsert(input, &result).await {
            tracing::warn!(error = %e, "failed to persist correction to cache");
        }
        Ok(result)
    }

    async fn retrieve(&self, input: &str, count: usize) -> Result<Vec<SupportExample>, GecError> {
        let candidates = count.saturating_mul(self.settings.oversample);
        let hits = self.support.query(input, candidates).await?;
        let total = hits.len();
        let examples: Vec<SupportExample> = hits
            .iter()
            .filter_map(|hit| SupportExample::from_metadata(&hit.metadata))
            .collect();
        if examples.len() < total {
            tracing::warn!(
                skipped = total - examples.len(),
                "support entries without a usable example record"
            );
        }
        Ok(examples)
    }

    /// Last chance after generation produced nothing usable.
    async fn degraded(&self, input: &str, reason: &str) -> Result<CorrectionResult, GecError> {
        counter!("gec_degraded_lookups_total").increment(1);
        match self.cache.lookup(input).await {
            Ok(Some(hit)) => {
                tracing::info!("serving cached correction after generation failure");
                Ok(hit)
            }
            Ok(None) => Err(GecError::GenerationFailed(format!(
                "{reason}; no cached fallback"
            ))),
            Err(e) => Err(GecError::GenerationFailed(format!(
                "{reason}; cache fallback failed: {e}"
            ))),
        }
    }
}

/// Async generation with a single blocking retry for transient failures.
struct Transport {
    generator: Arc<dyn Generator>,
    max_tokens: u32,
}

#[async_trait]
impl CompletionSource for Transport {
    async fn complete(&self, prompt: &str) -> Result<String, GecError> {
        let async_err = match self.generator.generate(prompt, self.max_tokens).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        if !async_err.is_retryable() {
            tracing::error!(error = %async_err, "generation failed without fallback");
            return Err(GecError::GenerationFailed(async_err.to_string()));
        }
        tracing::warn!(error = %async_err, "async generation failed, falling back to blocking transport");
        counter!("gec_generation_fallbacks_total").increment(1);

        let generator = Arc::clone(&self.generator);
        let prompt = prompt.to_string();
        let max_tokens = self.max_tokens;
        tokio::task::spawn_blocking(move || generator.generate_blocking(&prompt, max_tokens))
            .await
            .map_err(|e| GecError::GenerationFailed(format!("blocking generation task failed: {e}")))?
            .map_err(|e| {
                GecError::GenerationFailed(format!("async transport: {async_err}; blocking transport: {e}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generate::{GenerationError, ScriptedGenerator};
    use index::IndexConfig;
    use semantic::HashingEmbedder;
    use serde_json::json;

    const VALID: &str = r#"{"input":"He go home.","reasoning":"agreement","correction":"He goes home.","error_type":"SVA"}"#;

    fn service_with(generator: Arc<dyn Generator>, settings: ServiceSettings) -> CorrectionService {
        let embedder = Arc::new(HashingEmbedder::new("hash-test", 64));
        let support = Arc::new(VectorIndex::new(embedder.clone(), IndexConfig::default()));
        let cache = Arc::new(SimilarityCache::new(
            Arc::new(VectorIndex::new(embedder, IndexConfig::default())),
            0.95,
        ));
        CorrectionService::new(support, cache, generator, settings)
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_generation() {
        let generator = Arc::new(ScriptedGenerator::repeating(VALID));
        let service = service_with(generator.clone(), ServiceSettings::default());
        let err = service.correct(CorrectionRequest::new(" ")).await.unwrap_err();
        assert!(matches!(err, GecError::InvalidRequest(_)));
        assert_eq!(generator.calls(), 0);
        assert_eq!(service.metrics().misses, 0);
    }

    #[tokio::test]
    async fn async_failure_falls_back_to_blocking_once() {
        let generator = Arc::new(ScriptedGenerator::new([VALID]).with_async_failures(1));
        let service = service_with(generator.clone(), ServiceSettings::default());

        let result = service.correct(CorrectionRequest::new("He go home.")).await.unwrap();
        assert_eq!(result.correction, "He goes home.");
        assert_eq!(generator.async_calls(), 1);
        assert_eq!(generator.blocking_calls(), 1);
    }

    #[tokio::test]
    async fn both_transports_failing_with_empty_cache_is_generation_failure() {
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()).with_async_failures(1));
        let service = service_with(generator.clone(), ServiceSettings::default());

        let err = service.correct(CorrectionRequest::new("He go home.")).await.unwrap_err();
        assert!(matches!(err, GecError::GenerationFailed(_)));
        assert_eq!(generator.calls(), 2);
        // initial lookup plus the degraded one
        assert_eq!(service.metrics().misses, 2);
        assert!(service.cache().is_empty());
    }

    /// Rejects every call with an auth error and counts blocking calls.
    #[derive(Default)]
    struct RevokedKeyGenerator {
        blocking_calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Generator for RevokedKeyGenerator {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
            Err(GenerationError::Auth("invalid api key".into()))
        }

        fn generate_blocking(&self, _prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
            self.blocking_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(GenerationError::Auth("invalid api key".into()))
        }

        fn model_name(&self) -> &str {
            "revoked"
        }
    }

    #[tokio::test]
    async fn auth_failure_skips_blocking_fallback() {
        let generator = Arc::new(RevokedKeyGenerator::default());
        let service = service_with(generator.clone(), ServiceSettings::default());

        let err = service.correct(CorrectionRequest::new("He go home.")).await.unwrap_err();
        assert!(matches!(err, GecError::GenerationFailed(_)));
        assert!(err.to_string().contains("invalid api key"));
        assert_eq!(
            generator
                .blocking_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn invalid_first_completion_is_repaired() {
        let generator = Arc::new(ScriptedGenerator::new(["I cannot help", VALID]));
        let service = service_with(generator.clone(), ServiceSettings::default());

        let result = service.correct(CorrectionRequest::new("He go home.")).await.unwrap();
        assert_eq!(result.correction, "He goes home.");
        assert_eq!(generator.calls(), 2);
        assert!(generator.prompts()[1].contains("Previous response:\nI cannot help"));
    }

    #[tokio::test]
    async fn marker_result_is_returned_and_cached() {
        let generator = Arc::new(ScriptedGenerator::repeating("Correction: He goes home."));
        let service = service_with(generator.clone(), ServiceSettings::default());

        let result = service.correct(CorrectionRequest::new("He go home.")).await.unwrap();
        assert_eq!(result.correction, "He goes home.");
        assert_eq!(result.error_type, None);
        assert_eq!(service.cache().len(), 1);
    }

    #[tokio::test]
    async fn result_input_is_the_request_input() {
        let generator = Arc::new(ScriptedGenerator::new([
            r#"{"input":"something else","reasoning":"r","correction":"c"}"#,
        ]));
        let service = service_with(generator, ServiceSettings::default());
        let result = service.correct(CorrectionRequest::new("real input")).await.unwrap();
        assert_eq!(result.input, "real input");
    }

    #[tokio::test]
    async fn retrieval_examples_reach_the_prompt() {
        let generator = Arc::new(ScriptedGenerator::repeating(VALID));
        let service = service_with(generator.clone(), ServiceSettings::default());
        service
            .support()
            .add(
                &["She go to work.".to_string()],
                vec![json!({"value": {"input": "She go to work.", "reasoning": "agreement", "correction": "She goes to work.", "error_type": "SVA"}})],
            )
            .await
            .unwrap();

        service.correct(CorrectionRequest::new("He go home.")).await.unwrap();
        service
            .correct(CorrectionRequest::new("Totally different sentence here.").with_retrieval(false))
            .await
            .unwrap();

        let prompts = generator.prompts();
        assert!(prompts[0].contains("Example Input: She go to work."));
        assert!(!prompts[1].contains("Example Input:"));
        assert_eq!(service.metrics().support_count, 1);
    }

    #[tokio::test]
    async fn zero_top_k_skips_retrieval() {
        let generator = Arc::new(ScriptedGenerator::repeating(VALID));
        let service = service_with(generator.clone(), ServiceSettings::default());
        service
            .support()
            .add(
                &["x".to_string()],
                vec![json!({"input": "x", "correction": "y"})],
            )
            .await
            .unwrap();
        service
            .correct(CorrectionRequest::new("He go home.").with_top_k(0))
            .await
            .unwrap();
        assert!(!generator.prompts()[0].contains("Example Input:"));
    }

    #[tokio::test]
    async fn missing_error_type_can_be_inferred() {
        let generator = Arc::new(ScriptedGenerator::new([
            r#"{"reasoning":"extra article","correction":"I like music."}"#,
        ]));
        let settings = ServiceSettings {
            infer_error_type: true,
            ..ServiceSettings::default()
        };
        let service = service_with(generator, settings);
        let result = service
            .correct(CorrectionRequest::new("I like the music."))
            .await
            .unwrap();
        assert_eq!(result.error_type.as_deref(), Some("DET"));
    }

    /// Writes a cached answer while "generating", then returns nothing usable.
    struct RacingGenerator {
        cache: Arc<SimilarityCache>,
    }

    #[async_trait]
    impl Generator for RacingGenerator {
        async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
            if !prompt.contains("Previous response:") {
                let cached = CorrectionResult {
                    input: "He go home.".into(),
                    reasoning: "from cache".into(),
                    correction: "He goes home.".into(),
                    error_type: None,
                };
                self.cache
                    .upsert("He go home.", &cached)
                    .await
                    .map_err(|e| GenerationError::Provider(e.to_string()))?;
            }
            Ok("no idea".into())
        }

        fn generate_blocking(&self, _prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
            Ok("no idea".into())
        }

        fn model_name(&self) -> &str {
            "racing"
        }
    }

    #[tokio::test]
    async fn total_failure_serves_degraded_cache_hit() {
        let embedder = Arc::new(HashingEmbedder::new("hash-test", 64));
        let support = Arc::new(VectorIndex::new(embedder.clone(), IndexConfig::default()));
        let cache = Arc::new(SimilarityCache::new(
            Arc::new(VectorIndex::new(embedder, IndexConfig::default())),
            0.95,
        ));
        let generator = Arc::new(RacingGenerator {
            cache: Arc::clone(&cache),
        });
        let service = CorrectionService::new(support, cache, generator, ServiceSettings::default());

        let result = service.correct(CorrectionRequest::new("He go home.")).await.unwrap();
        assert_eq!(result.reasoning, "from cache");
        let metrics = service.metrics();
        assert_eq!((metrics.hits, metrics.misses), (1, 1));
    }

    #[test]
    fn settings_follow_config() {
        let mut cfg = GecConfig::default();
        cfg.retrieval.top_k = 3;
        cfg.retrieval.enabled = false;
        cfg.generation.max_tokens = 99;
        let settings = ServiceSettings::from_config(&cfg);
        assert_eq!(settings.top_k, 3);
        assert!(!settings.retrieval_enabled);
        assert_eq!(settings.max_tokens, 99);
        assert_eq!(settings.oversample, 2);
    }
}
