use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::{Embedder, SemanticError};

/// LRU layer in front of another [`Embedder`].
///
/// Keys are the exact input text. Only the texts that miss are forwarded to
/// the inner provider, in one batch, and the output order always matches the
/// input order.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing: Vec<usize> = Vec::new();
        {
            // A poisoned cache only costs us hits; fall through to the provider.
            if let Ok(mut cache) = self.cache.lock() {
                for (i, text) in texts.iter().enumerate() {
                    match cache.get(text) {
                        Some(v) => out[i] = Some(v.as_ref().clone()),
                        None => missing.push(i),
                    }
                }
            } else {
                missing.extend(0..texts.len());
            }
        }

        if !missing.is_empty() {
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed(&batch).await?;
            if fresh.len() != batch.len() {
                return Err(SemanticError::MalformedResponse(format!(
                    "provider returned {} embeddings for {} inputs",
                    fresh.len(),
                    batch.len()
                )));
            }
            let mut cache = self.cache.lock().ok();
            for (slot, vector) in missing.into_iter().zip(fresh) {
                if let Some(cache) = cache.as_mut() {
                    cache.put(texts[slot].clone(), Arc::new(vector.clone()));
                }
                out[slot] = Some(vector);
            }
        }

        Ok(out.into_iter().flatten().collect())
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }
}
