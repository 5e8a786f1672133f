//! Shared application state

use geolens_engine::Engine;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Identification engine
    pub engine: Arc<Engine>,

    /// Prometheus handle for rendering; `None` when no recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(engine: Engine, metrics_handle: Option<PrometheusHandle>) -> Self {
        Self {
            engine: Arc::new(engine),
            metrics_handle,
        }
    }
}
