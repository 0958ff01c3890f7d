use async_trait::async_trait;
use fxhash::hash64;

use crate::normalize::l2_normalize_in_place;
use crate::{Embedder, SemanticError};

/// Deterministic local embedder based on feature hashing.
///
/// Lower-cased word tokens and character trigrams are hashed into `dimension`
/// buckets with a sign bit, then the vector is L2-normalized. Texts sharing
/// most tokens land close together, which is enough for near-duplicate cache
/// hits and for tests. It is not a semantic model, so the identifier it
/// reports is `hash-fx:{label}:{dimension}` and never collides with the name
/// of a real model served by an API provider.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    identifier: String,
    dimension: usize,
}

/// Prefix of every [`HashingEmbedder`] identifier.
pub const HASH_MODEL_PREFIX: &str = "hash-fx";

impl HashingEmbedder {
    pub fn new(label: impl AsRef<str>, dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            identifier: format!("{HASH_MODEL_PREFIX}:{}:{dimension}", label.as_ref()),
            dimension,
        }
    }

    /// Embed a single text without going through the async trait.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        let lowered = text.to_lowercase();

        for token in lowered.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric());
            if token.is_empty() {
                continue;
            }
            self.bump(&mut v, token.as_bytes(), 1.0);

            let chars: Vec<char> = format!("#{token}#").chars().collect();
            for window in chars.windows(3) {
                let gram: String = window.iter().collect();
                self.bump(&mut v, gram.as_bytes(), 0.5);
            }
        }

        if !l2_normalize_in_place(&mut v) {
            // Blank or punctuation-only input still needs a unit vector.
            let h = hash64(lowered.as_bytes());
            v[(h % self.dimension as u64) as usize] = 1.0;
        }
        v
    }

    fn bump(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let h = hash64(feature);
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn model_name(&self) -> &str {
        &self.identifier
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}
