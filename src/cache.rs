//! Similarity cache over past corrections.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use index::VectorIndex;
use metrics::counter;
use serde_json::{json, Value};

use crate::types::CorrectionResult;
use crate::GecError;

/// A [`VectorIndex`] of `(input, CorrectionResult)` pairs with hit/miss counters.
pub struct SimilarityCache {
    index: Arc<VectorIndex>,
    threshold: f32,
    path: Option<PathBuf>,
    warn_entries: usize,
    warned: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SimilarityCache {
    pub fn new(index: Arc<VectorIndex>, threshold: f32) -> Self {
        Self {
            index,
            threshold,
            path: None,
            warn_entries: 0,
            warned: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Persist to `path` after every upsert.
    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.path = path;
        self
    }

    /// Warn once when the cache grows past `entries`. `0` disables the warning.
    pub fn with_warn_entries(mut self, entries: usize) -> Self {
        self.warn_entries = entries;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Stored result for the nearest cached input, if it is at least
    /// `threshold` similar to `text`. Counts exactly one hit or one miss.
    pub async fn lookup(&self, text: &str) -> Result<Option<CorrectionResult>, GecError> {
        let nearest = match self.index.query(text, 1).await {
            Ok(results) => results.into_iter().next(),
            Err(e) => {
                self.record_miss();
                return Err(e.into());
            }
        };

        let Some(nearest) = nearest else {
            self.record_miss();
            return Ok(None);
        };
        if nearest.score < self.threshold {
            tracing::debug!(score = nearest.score, threshold = self.threshold, "cache miss");
            self.record_miss();
            return Ok(None);
        }

        match decode_entry(&nearest.metadata) {
            Some(result) => {
                tracing::debug!(score = nearest.score, entry = nearest.index, "cache hit");
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("gec_cache_lookups_total", "outcome" => "hit").increment(1);
                Ok(Some(result))
            }
            None => {
                tracing::warn!(entry = nearest.index, "cached entry does not decode; treating as miss");
                self.record_miss();
                Ok(None)
            }
        }
    }

    /// Append `(text, result)` and write the cache through to disk.
    pub async fn upsert(&self, text: &str, result: &CorrectionResult) -> Result<(), GecError> {
        let metadata = json!({ "value": result });
        let rows = self.index.add(&[text.to_string()], vec![metadata]).await?;

        if self.warn_entries > 0
            && rows > self.warn_entries
            && !self.warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                entries = rows,
                soft_limit = self.warn_entries,
                "similarity cache is past its soft limit; entries are never evicted"
            );
        }

        if let Some(path) = self.path.clone() {
            let index = Arc::clone(&self.index);
            tokio::task::spawn_blocking(move || index.save(&path))
                .await
                .map_err(|e| GecError::Storage(format!("cache save task failed: {e}")))??;
        }
        Ok(())
    }

    /// `(hits, misses, hit_rate)`; the rate is `0.0` before any lookup.
    pub fn metrics(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        (hits, misses, hit_rate)
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("gec_cache_lookups_total", "outcome" => "miss").increment(1);
    }
}

/// Entries are written as `{"value": result}`; bare results are accepted too.
fn decode_entry(metadata: &Value) -> Option<CorrectionResult> {
    let record = metadata.get("value").unwrap_or(metadata);
    serde_json::from_value(record.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::IndexConfig;
    use semantic::HashingEmbedder;

    fn cache(threshold: f32) -> SimilarityCache {
        let embedder = Arc::new(HashingEmbedder::new("hash-test", 64));
        SimilarityCache::new(
            Arc::new(VectorIndex::new(embedder, IndexConfig::default())),
            threshold,
        )
    }

    fn result(input: &str) -> CorrectionResult {
        CorrectionResult {
            input: input.into(),
            reasoning: "tense".into(),
            correction: "She went to school yesterday.".into(),
            error_type: Some("VT".into()),
        }
    }

    #[test]
    fn hit_rate_is_zero_before_lookups() {
        assert_eq!(cache(0.95).metrics(), (0, 0, 0.0));
    }

    #[tokio::test]
    async fn empty_cache_counts_one_miss() {
        let cache = cache(0.95);
        assert!(cache.lookup("anything").await.unwrap().is_none());
        assert_eq!(cache.metrics(), (0, 1, 0.0));
    }

    #[tokio::test]
    async fn exact_repeat_hits_and_unrelated_misses() {
        let cache = cache(0.95);
        let input = "She go to school yesterday.";
        cache.upsert(input, &result(input)).await.unwrap();

        assert_eq!(cache.lookup(input).await.unwrap(), Some(result(input)));
        assert!(cache
            .lookup("Completely unrelated words about turtles")
            .await
            .unwrap()
            .is_none());

        let (hits, misses, rate) = cache.metrics();
        assert_eq!((hits, misses), (1, 1));
        assert!((rate - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn threshold_above_one_never_hits() {
        let cache = cache(1.01);
        cache.upsert("a b c", &result("a b c")).await.unwrap();
        assert!(cache.lookup("a b c").await.unwrap().is_none());
        assert_eq!(cache.metrics().1, 1);
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = cache(0.5);
        cache
            .index()
            .add(&["broken".to_string()], vec![json!({"value": {"nope": 1}})])
            .await
            .unwrap();
        assert!(cache.lookup("broken").await.unwrap().is_none());
        assert_eq!(cache.metrics(), (0, 1, 0.0));
    }

    #[tokio::test]
    async fn upsert_writes_through_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.gecidx");
        let cache = cache(0.95).with_path(Some(path.clone()));
        cache.upsert("He go home.", &result("He go home.")).await.unwrap();

        let embedder = Arc::new(HashingEmbedder::new("hash-test", 64));
        let reopened = VectorIndex::open(embedder, IndexConfig::default(), &path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            decode_entry(&reopened.snapshot().metadata()[0]),
            Some(result("He go home."))
        );
    }

    /// Fixed 2-d vectors so similarity scores are exact.
    struct TableEmbedder(Vec<(&'static str, [f32; 2])>);

    #[async_trait::async_trait]
    impl semantic::Embedder for TableEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, semantic::SemanticError> {
            texts
                .iter()
                .map(|t| {
                    self.0
                        .iter()
                        .find(|(k, _)| *k == t.as_str())
                        .map(|(_, v)| v.to_vec())
                        .ok_or_else(|| semantic::SemanticError::Request(format!("unknown text {t}")))
                })
                .collect()
        }

        fn model_name(&self) -> &str {
            "table"
        }
    }

    fn table_cache(threshold: f32) -> SimilarityCache {
        let sin = |c: f32| (1.0 - c * c).sqrt();
        let embedder = TableEmbedder(vec![
            ("stored", [1.0, 0.0]),
            ("at-threshold", [0.75, sin(0.75)]),
            ("near", [0.9, sin(0.9)]),
            ("just-below", [0.74, sin(0.74)]),
        ]);
        SimilarityCache::new(
            Arc::new(VectorIndex::new(Arc::new(embedder), IndexConfig::default())),
            threshold,
        )
    }

    #[tokio::test]
    async fn score_equal_to_threshold_hits() {
        let cache = table_cache(0.75);
        cache.upsert("stored", &result("stored")).await.unwrap();

        assert_eq!(cache.lookup("at-threshold").await.unwrap(), Some(result("stored")));
        assert_eq!(cache.metrics(), (1, 0, 1.0));
    }

    #[tokio::test]
    async fn near_duplicate_between_threshold_and_one_hits() {
        let cache = table_cache(0.75);
        cache.upsert("stored", &result("stored")).await.unwrap();

        assert_eq!(cache.lookup("near").await.unwrap(), Some(result("stored")));
        assert_eq!(cache.metrics().0, 1);
    }

    #[tokio::test]
    async fn score_just_below_threshold_is_one_miss() {
        let cache = table_cache(0.75);
        cache.upsert("stored", &result("stored")).await.unwrap();

        assert!(cache.lookup("just-below").await.unwrap().is_none());
        assert_eq!(cache.metrics(), (0, 1, 0.0));
    }

    #[test]
    fn decode_accepts_bare_results() {
        let bare = serde_json::to_value(result("x")).unwrap();
        assert_eq!(decode_entry(&bare), Some(result("x")));
    }
}
