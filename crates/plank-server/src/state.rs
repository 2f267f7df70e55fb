//! Shared application state.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use plank_relay::{ReplayBuffer, SessionRegistry};
use plank_store::ObjectStore;

/// Everything the handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The object store.
    pub store: Arc<ObjectStore>,
    /// The subscriber session registry.
    pub registry: Arc<SessionRegistry>,
    /// The replay buffer filled by the feed listener.
    pub replay: Arc<ReplayBuffer>,
    /// Prometheus render handle for `/metrics`.
    pub prometheus: PrometheusHandle,
}
