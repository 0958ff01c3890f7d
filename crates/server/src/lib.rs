//! GEC Server - HTTP API for retrieval-augmented grammatical error correction
//!
//! Exposes one shared [`gec::CorrectionService`] over HTTP.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `POST /correct` - `{input, top_k?, use_retrieval?}` to `{input, reasoning, correction, error_type}`
//! - `GET /metrics` - `{hits, misses, hit_rate, support_count}`
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe with index sizes
//! - `GET /metrics/prometheus` - Prometheus text exposition
//!
//! Errors are returned as `{"error": {"code": "...", "message": "..."}}`.
//!
//! # Configuration
//!
//! An optional `server.{toml,yaml,json}` file and `GEC_SERVER__*`
//! environment variables (e.g. `GEC_SERVER__PORT=9000`). The pipeline itself
//! is configured by the YAML file named in `pipeline_config`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
