use crate::config::ServerConfig;
use gec::{CorrectionService, GecConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Correction pipeline (shared across requests)
    pub service: Arc<CorrectionService>,

    /// Renders `/metrics/prometheus`; `None` when metrics are disabled
    pub prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    /// Build the correction service from the configured pipeline file
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let pipeline = GecConfig::load(config.pipeline_config.as_deref())?;
        let service = CorrectionService::from_config(&pipeline)?;
        Ok(Self::with_service(config, Arc::new(service)))
    }

    /// Wrap an already-built service
    pub fn with_service(config: ServerConfig, service: Arc<CorrectionService>) -> Self {
        Self {
            config: Arc::new(config),
            service,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}
