//! # GEC Index
//!
//! An in-memory vector index of (embedding, metadata) entries with
//! nearest-neighbor lookup and single-file persistence. The retrieval
//! pipeline keeps two of them: one over curated support examples and one
//! over past corrections (the similarity cache).
//!
//! ## Core Features
//!
//! - **Ordered entries**: entries are append-only; an entry's position is its
//!   identity and the tie-break key when two scores are equal.
//! - **Exact ranking**: every query scores all rows by dot product over
//!   L2-normalized vectors (cosine similarity). Small indexes use a scalar
//!   loop, larger ones an `ndarray` matrix-vector product; both give the same
//!   ranking.
//! - **Copy-on-write snapshots**: readers load an immutable [`Snapshot`]
//!   without locking. Writers build the next snapshot off to the side and
//!   publish it atomically, so a query never sees a half-appended entry.
//! - **Atomic persistence**: the whole index is one artifact file (bincode,
//!   optionally zstd-compressed) written to a temp file and renamed into
//!   place.
//!
//! ## Example Usage
//!
//! ```
//! use index::{IndexConfig, VectorIndex};
//! use semantic::HashingEmbedder;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let embedder = Arc::new(HashingEmbedder::new("hash", 64));
//! let index = VectorIndex::new(embedder, IndexConfig::default());
//!
//! index
//!     .add(
//!         &["She go to school.".to_string()],
//!         vec![json!({ "correction": "She goes to school." })],
//!     )
//!     .await
//!     .unwrap();
//!
//! let hits = index.query("She go to school.", 1).await.unwrap();
//! assert_eq!(hits[0].index, 0);
//! # }
//! ```

mod artifact;
mod query;
mod vector;

pub use artifact::{ARTIFACT_MAGIC, INDEX_SCHEMA_VERSION};
pub use query::{rank_top_k, QueryResult, ScoringMode};
pub use vector::{IndexStats, Snapshot, VectorIndex};

use thiserror::Error;

/// Provenance key naming the embedding model that produced the vectors.
pub const PROVENANCE_EMBEDDING_MODEL: &str = "embedding_model";

/// Compression codec options for the persisted artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    /// No compression (useful for debugging).
    None,
    /// Zstd compression (default, good balance of speed and ratio).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    /// The compression codec to use (None or Zstd).
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, where higher = better compression but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }
}

/// Config for initializing the index.
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Compression settings for the persisted artifact.
    pub compression: CompressionConfig,
    /// Which scoring path to use once the index is large enough.
    pub scoring: ScoringMode,
    /// Below this many rows queries always use the scalar loop.
    pub min_rows_for_matrix: usize,
    /// Fail `load` when the artifact was built with a different embedding model.
    /// When false a mismatch is only logged.
    pub reject_model_mismatch: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            scoring: ScoringMode::Matrix,
            min_rows_for_matrix: 64,
            reject_model_mismatch: false,
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringMode) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_min_rows_for_matrix(mut self, min: usize) -> Self {
        self.min_rows_for_matrix = min;
        self
    }

    pub fn with_reject_model_mismatch(mut self, reject: bool) -> Self {
        self.reject_model_mismatch = reject;
        self
    }

    /// Pick the scoring path for an index holding `rows` entries.
    pub fn scoring_for(&self, rows: usize) -> ScoringMode {
        match self.scoring {
            ScoringMode::Matrix if rows >= self.min_rows_for_matrix => ScoringMode::Matrix,
            _ => ScoringMode::Scalar,
        }
    }
}

/// Errors raised by [`VectorIndex`].
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    /// Reading or writing the artifact failed, or its contents are malformed.
    #[error("storage error: {0}")]
    Storage(String),
    /// An embedding's dimension disagrees with the index dimension.
    #[error("dimension mismatch: index holds {expected}-d vectors, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// The caller passed inconsistent arguments (e.g., texts and metadata of different lengths).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The embedding provider failed.
    #[error("embedding provider error: {0}")]
    Embedding(#[from] semantic::SemanticError),
}

impl IndexError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage(err.to_string())
    }

    /// True for failures of the persisted or in-memory store itself.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            IndexError::Storage(_) | IndexError::DimensionMismatch { .. }
        )
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Storage(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for IndexError {
    fn from(e: bincode::error::EncodeError) -> Self {
        IndexError::Storage(format!("encode failed: {e}"))
    }
}

impl From<bincode::error::DecodeError> for IndexError {
    fn from(e: bincode::error::DecodeError) -> Self {
        IndexError::Storage(format!("decode failed: {e}"))
    }
}
