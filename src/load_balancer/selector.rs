//! Lowest-latency load balancing strategy.

use std::sync::Arc;
use std::time::Duration;

use crate::load_balancer::{backend::Backend, SelectError, Selector};
use crate::store::{parse_duration, LatencySnapshot};

/// Picks the backend whose last observed latency is the smallest.
///
/// Ties go to whichever entry the snapshot yields first; snapshot order is not
/// stable, so tied backends share traffic loosely.
#[derive(Debug, Default)]
pub struct LowestLatency;

impl LowestLatency {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for LowestLatency {
    fn next_server(
        &self,
        backends: &[Arc<Backend>],
        latencies: &LatencySnapshot,
    ) -> Result<Arc<Backend>, SelectError> {
        if backends.is_empty() {
            return Err(SelectError::NoBackendsAvailable);
        }

        let mut best: Option<(&str, Duration)> = None;
        let mut skipped = 0usize;

        for (endpoint, raw) in latencies {
            match parse_duration(raw) {
                Ok(latency) => {
                    if best.map_or(true, |(_, min)| latency < min) {
                        best = Some((endpoint.as_str(), latency));
                    }
                }
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(endpoint = %endpoint, value = %raw, error = %e, "Skipping unparseable latency");
                }
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, total = latencies.len(), "Latency snapshot had unusable entries");
        }

        let (winner, latency) = best.ok_or(SelectError::BackendNotFound { endpoint: None })?;

        match backends.iter().find(|b| b.endpoint() == winner) {
            Some(backend) => {
                tracing::trace!(backend = %backend, latency = ?latency, "Selected backend");
                Ok(backend.clone())
            }
            None => Err(SelectError::BackendNotFound {
                endpoint: Some(winner.to_string()),
            }),
        }
    }
}
