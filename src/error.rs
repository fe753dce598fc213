//! Request-path errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::load_balancer::SelectError;
use crate::security::AdmissionError;

/// Anything that ends a request before the backend response starts streaming.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("error checking rate limit: {0}")]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Selection(#[from] SelectError),
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Admission(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Selection(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = match self {
            ProxyError::RateLimited => "Rate limit exceeded",
            ProxyError::Admission(_) => "Error checking rate limit",
            ProxyError::Selection(_) => "No backend available",
            ProxyError::Upstream(_) => "Upstream request failed",
        };
        (self.status(), message).into_response()
    }
}
