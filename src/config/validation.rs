//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, rates finite, burst >= 1)
//! - Check addresses and backend endpoints parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use crate::config::schema::{BalancerConfig, StoreKind};
use crate::load_balancer::backend::Backend;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    for (i, endpoint) in config.backends.iter().enumerate() {
        if let Err(e) = Backend::parse(endpoint) {
            errors.push(ValidationError::new(format!("backends[{i}]"), e.to_string()));
        }
    }

    if config.store.kind == StoreKind::Redis && config.store.url.trim().is_empty() {
        errors.push(ValidationError::new("store.url", "must not be empty"));
    }
    if config.store.key.trim().is_empty() {
        errors.push(ValidationError::new("store.key", "must not be empty"));
    }
    if config.store.ping_timeout_secs == 0 {
        errors.push(ValidationError::new("store.ping_timeout_secs", "must be greater than 0"));
    }
    if config.store.op_timeout_ms == 0 {
        errors.push(ValidationError::new("store.op_timeout_ms", "must be greater than 0"));
    }

    let rl = &config.rate_limit;
    if !rl.refill_rate.is_finite() || rl.refill_rate < 0.0 {
        errors.push(ValidationError::new(
            "rate_limit.refill_rate",
            "must be a finite, non-negative number",
        ));
    }
    if rl.burst == 0 {
        errors.push(ValidationError::new("rate_limit.burst", "must be at least 1"));
    }
    if rl.client_param.is_empty() {
        errors.push(ValidationError::new("rate_limit.client_param", "must not be empty"));
    }
    if rl.max_body_bytes == 0 {
        errors.push(ValidationError::new("rate_limit.max_body_bytes", "must be greater than 0"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
