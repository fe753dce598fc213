//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request admitted
//!     → pool.rs (registry snapshot + store snapshot)
//!     → selector.rs (lowest last-observed latency wins)
//!     → backend.rs (resolved endpoint)
//!     → Return backend or error
//! ```
//!
//! # Design Decisions
//! - Selection is stateless; the shared store carries all health signal
//! - Two instances may pick the same backend from the same snapshot
//! - A stale winner is reported, not retried; the caller decides

pub mod backend;
pub mod pool;
pub mod registry;
pub mod selector;

use std::sync::Arc;

use crate::store::{LatencySnapshot, StoreError};
use backend::Backend;

pub use pool::BackendPool;
pub use registry::{BackendRegistry, RegistryError};
pub use selector::LowestLatency;

/// Reasons no backend could be chosen for a request.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("no backends available")]
    NoBackendsAvailable,
    /// The store had no usable entry, or its best entry is not registered here.
    #[error("backend not found{}", .endpoint.as_deref().map(|e| format!(": {e}")).unwrap_or_default())]
    BackendNotFound { endpoint: Option<String> },
    #[error("failed to read latencies: {0}")]
    Store(#[from] StoreError),
}

/// Strategy for picking a backend out of a registry snapshot.
pub trait Selector: Send + Sync + std::fmt::Debug {
    fn next_server(
        &self,
        backends: &[Arc<Backend>],
        latencies: &LatencySnapshot,
    ) -> Result<Arc<Backend>, SelectError>;
}
