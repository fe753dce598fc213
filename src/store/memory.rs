//! In-process latency store.
//!
//! Used for single-instance deployments and as the fake behind selector and
//! dispatcher tests. Holds the same serialized values a Redis hash would.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::store::{format_duration, LatencySnapshot, LatencyStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryLatencyStore {
    fields: RwLock<HashMap<String, String>>,
}

impl InMemoryLatencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw field value, bypassing duration formatting.
    ///
    /// Lets tests plant values written by other instances, including malformed ones.
    pub fn set_raw(&self, endpoint: &str, value: &str) {
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.to_string(), value.to_string());
    }

    /// Read one raw field value.
    pub fn get_raw(&self, endpoint: &str) -> Option<String> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
            .cloned()
    }
}

#[async_trait]
impl LatencyStore for InMemoryLatencyStore {
    async fn ping(&self, _timeout: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_latency(&self, endpoint: &str, latency: Duration) -> Result<(), StoreError> {
        self.set_raw(endpoint, &format_duration(latency));
        Ok(())
    }

    async fn all_latencies(&self) -> Result<LatencySnapshot, StoreError> {
        Ok(self
            .fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_latency_is_idempotent() {
        let store = InMemoryLatencyStore::new();
        let endpoint = "http://10.0.0.1:5000";

        store.set_latency(endpoint, Duration::from_millis(42)).await.unwrap();
        let first = store.all_latencies().await.unwrap();

        store.set_latency(endpoint, Duration::from_millis(42)).await.unwrap();
        let second = store.all_latencies().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.get(endpoint).map(String::as_str), Some("42ms"));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = InMemoryLatencyStore::new();
        store.set_latency("http://a:1", Duration::from_millis(5)).await.unwrap();
        store.set_latency("http://a:1", Duration::from_millis(7)).await.unwrap();
        assert_eq!(store.get_raw("http://a:1").as_deref(), Some("7ms"));
        assert_eq!(store.all_latencies().await.unwrap().len(), 1);
    }
}
