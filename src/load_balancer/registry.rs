//! Backend registry.
//!
//! Multiple readers, single writer. Every registered backend gets a zero latency
//! record in the shared store before it becomes visible to selection.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::load_balancer::backend::{Backend, InvalidEndpoint};
use crate::store::{LatencyStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidEndpoint(#[from] InvalidEndpoint),
    #[error("failed to initialize latency record for {endpoint}: {source}")]
    Store {
        endpoint: String,
        #[source]
        source: StoreError,
    },
}

pub struct BackendRegistry {
    backends: RwLock<Vec<Arc<Backend>>>,
    store: Arc<dyn LatencyStore>,
}

impl BackendRegistry {
    pub fn new(store: Arc<dyn LatencyStore>) -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
            store,
        }
    }

    /// Register a backend endpoint.
    ///
    /// The zero latency record is written first; if that fails the backend is not
    /// added, so selection never sees a backend the store knows nothing about.
    /// Duplicates are not rejected.
    pub async fn add(&self, endpoint: &str) -> Result<Arc<Backend>, RegistryError> {
        let backend = Arc::new(Backend::parse(endpoint)?);

        self.store
            .set_latency(backend.endpoint(), Duration::ZERO)
            .await
            .map_err(|source| RegistryError::Store {
                endpoint: backend.endpoint().to_string(),
                source,
            })?;

        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(backend.clone());

        tracing::info!(backend = %backend, "Added backend");
        Ok(backend)
    }

    /// Current backends in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.backends.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
