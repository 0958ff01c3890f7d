//! GEC Semantic
//!
//! This crate is the embedding-provider boundary. Texts go in, one
//! L2-normalized vector per text comes out, in input order. Everything that
//! needs similarity (the support index, the response cache) goes through the
//! [`Embedder`] trait and never sees which provider is behind it.
//!
//! Two providers ship here:
//!
//! - **Hash mode** - [`HashingEmbedder`], deterministic feature hashing over
//!   words and character trigrams. No network, no model files. Good for tests,
//!   local development and near-duplicate detection.
//! - **API mode** - [`ApiEmbedder`], a remote HTTP provider (Hugging Face,
//!   OpenAI, or a custom `{"texts": [...]}` endpoint).
//!
//! Either can be wrapped in a [`CachedEmbedder`] so repeated inputs skip the
//! provider entirely.
//!
//! ## Quick example
//!
//! ```
//! use semantic::{build_embedder, SemanticConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let embedder = build_embedder(&SemanticConfig::default()).unwrap();
//!     let vectors = embedder
//!         .embed(&["She go to school yesterday.".to_string()])
//!         .await
//!         .unwrap();
//!     assert_eq!(vectors[0].len(), 384);
//! }
//! ```

pub mod config;
pub mod error;

mod api;
mod cache;
mod normalize;
mod stub;

use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub use api::ApiEmbedder;
pub use cache::CachedEmbedder;
pub use config::SemanticConfig;
pub use error::SemanticError;
pub use normalize::{is_unit_length, l2_norm, l2_normalize_in_place, NORM_TOLERANCE};
pub use stub::{HashingEmbedder, HASH_MODEL_PREFIX};

/// An embedding provider.
///
/// Implementations must be deterministic for a fixed model and text, and must
/// return exactly one L2-normalized vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError>;

    /// Embed one text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        let mut out = self.embed(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| SemanticError::MalformedResponse("provider returned no embedding".into()))
    }

    /// Model label recorded in index provenance.
    fn model_name(&self) -> &str;

    /// Output dimension, when known up front.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// Build the provider described by `cfg`, wrapped in an LRU cache when
/// `cache_capacity > 0`.
pub fn build_embedder(cfg: &SemanticConfig) -> Result<Arc<dyn Embedder>, SemanticError> {
    cfg.validate()?;
    let base: Arc<dyn Embedder> = match cfg.mode.as_str() {
        "api" => Arc::new(ApiEmbedder::new(cfg)?),
        _ => Arc::new(HashingEmbedder::new(cfg.model_name.clone(), cfg.dimension)),
    };
    Ok(match NonZeroUsize::new(cfg.cache_capacity) {
        Some(capacity) => Arc::new(CachedEmbedder::new(base, capacity)),
        None => base,
    })
}
