//! Retrieval-augmented grammatical error correction.
//!
//! This crate stitches the workspace together: a sentence comes in, the
//! similarity cache is consulted, similar curated examples are retrieved
//! from the support index, a few-shot prompt is assembled, a generation
//! provider is asked for a structured correction and the answer is repaired
//! into a [`CorrectionResult`] before being cached and returned.
//!
//! ```text
//! CorrectionRequest
//!   └─▶ SimilarityCache::lookup ──hit──▶ CorrectionResult
//!         └─miss─▶ VectorIndex::query (support)
//!                    └─▶ ExampleAssembler::assemble
//!                          └─▶ Generator (async, one blocking fallback)
//!                                └─▶ RepairLoop ─▶ SimilarityCache::upsert ─▶ CorrectionResult
//! ```
//!
//! Everything a request needs lives in a [`CorrectionService`]; there is no
//! global state.
//!
//! ```no_run
//! use gec::{CorrectionRequest, CorrectionService, GecConfig};
//!
//! # async fn run() -> Result<(), gec::GecError> {
//! let config = GecConfig::load(None)?;
//! let service = CorrectionService::from_config(&config)?;
//! let result = service
//!     .correct(CorrectionRequest::new("She go to school yesterday."))
//!     .await?;
//! println!("{}", result.correction);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod classify;
pub mod config;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod pipeline;
pub mod prompt;
pub mod repair;
pub mod types;

pub use cache::SimilarityCache;
pub use classify::{classify_error, ErrorTaxonomy};
pub use config::{ConfigLoadError, GecConfig};
pub use dataset::{DatasetError, DatasetItem};
pub use error::GecError;
pub use pipeline::{CorrectionService, ServiceSettings};
pub use prompt::{ExampleAssembler, Prompt, PromptError};
pub use repair::{RepairLoop, RepairOutcome, RepairSource, MAX_GENERATION_ATTEMPTS};
pub use types::{CorrectionRequest, CorrectionResult, ServiceMetrics, SupportExample};

pub use generate::{GenerationConfig, GenerationError, Generator, ScriptedGenerator};
pub use index::{IndexConfig, IndexError, QueryResult, VectorIndex};
pub use semantic::{Embedder, HashingEmbedder, SemanticConfig, SemanticError};
