//! GEC Generate
//!
//! The generation-provider boundary: a prompt and a token cap go in, one raw
//! completion string comes out. Nothing here interprets the text; the
//! pipeline's repair loop does that.
//!
//! Every [`Generator`] exposes two transports. `generate` is the normal async
//! path. `generate_blocking` is a synchronous path the pipeline falls back to
//! once when the async call fails; it must be run off the async workers
//! (e.g. inside `tokio::task::spawn_blocking`).

pub mod config;
pub mod error;

mod openai;
mod scripted;

use async_trait::async_trait;
use std::sync::Arc;

pub use config::GenerationConfig;
pub use error::GenerationError;
pub use openai::OpenAiGenerator;
pub use scripted::ScriptedGenerator;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError>;

    /// Synchronous transport. Blocks the calling thread.
    fn generate_blocking(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Build the provider named in `cfg`.
pub fn build_generator(cfg: &GenerationConfig) -> Result<Arc<dyn Generator>, GenerationError> {
    match cfg.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGenerator::new(cfg.clone())?)),
        other => Err(GenerationError::InvalidConfig(format!(
            "unknown generation provider '{other}'"
        ))),
    }
}
