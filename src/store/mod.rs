//! Shared latency store subsystem.
//!
//! # Data Flow
//! ```text
//! registry.add(endpoint)     → set_latency(endpoint, 0s)
//! pool.next_backend()        → all_latencies() → selector
//! dispatcher (body finished) → set_latency(endpoint, elapsed)
//! ```
//!
//! # Design Decisions
//! - One hash of `endpoint -> duration string`, shared by every balancer instance
//! - No locking across instances: last write wins per field
//! - Values stay serialized here; parsing belongs to the selector, which skips bad entries
//! - The trait is the only seam; Redis in production, memory in tests

pub mod duration;
pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

pub use duration::{format_duration, parse_duration, ParseDurationError};
pub use memory::InMemoryLatencyStore;
pub use self::redis::RedisLatencyStore;

/// Raw store contents: canonical endpoint -> serialized duration.
pub type LatencySnapshot = HashMap<String, String>;

/// Errors raised by a latency store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value view of the last observed latency per backend.
#[async_trait]
pub trait LatencyStore: Send + Sync {
    /// Check connectivity, failing if no answer arrives within `timeout`.
    async fn ping(&self, timeout: Duration) -> Result<(), StoreError>;

    /// Overwrite the latency field for one endpoint.
    async fn set_latency(&self, endpoint: &str, latency: Duration) -> Result<(), StoreError>;

    /// Read every field of the hash.
    async fn all_latencies(&self) -> Result<LatencySnapshot, StoreError>;
}
