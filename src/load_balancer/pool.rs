//! Backend pool management.
//!
//! # Responsibilities
//! - Combine the registry snapshot with a fresh store snapshot
//! - Apply the selection strategy

use std::sync::Arc;

use crate::load_balancer::{
    backend::Backend, registry::BackendRegistry, selector::LowestLatency, SelectError, Selector,
};
use crate::store::LatencyStore;

/// Chooses a backend per request from live latency data.
pub struct BackendPool {
    registry: Arc<BackendRegistry>,
    store: Arc<dyn LatencyStore>,
    selector: Box<dyn Selector>,
}

impl BackendPool {
    /// Pool using the lowest-latency strategy.
    pub fn new(registry: Arc<BackendRegistry>, store: Arc<dyn LatencyStore>) -> Self {
        Self::with_selector(registry, store, Box::new(LowestLatency::new()))
    }

    pub fn with_selector(
        registry: Arc<BackendRegistry>,
        store: Arc<dyn LatencyStore>,
        selector: Box<dyn Selector>,
    ) -> Self {
        Self {
            registry,
            store,
            selector,
        }
    }

    /// Select the backend for one request.
    ///
    /// An empty registry fails before the store is consulted.
    pub async fn next_backend(&self) -> Result<Arc<Backend>, SelectError> {
        let backends = self.registry.snapshot();
        if backends.is_empty() {
            return Err(SelectError::NoBackendsAvailable);
        }

        let latencies = self.store.all_latencies().await?;
        self.selector.next_server(&backends, &latencies)
    }
}
