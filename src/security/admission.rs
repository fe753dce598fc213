//! Admission control middleware.
//!
//! Extracts the client identity from the query string and the JSON-RPC method from
//! the body, then consults the rate limiter. The body is buffered for inspection and
//! re-attached so the dispatcher forwards it untouched.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::config::RateLimitConfig;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::security::rate_limit::{LimiterPoisoned, MethodRateLimiter};

/// Failures while evaluating admission. Distinct from a denial.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] axum::Error),
    #[error("request body is not a JSON-RPC call: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error(transparent)]
    Internal(#[from] LimiterPoisoned),
}

/// Outcome of a successful admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Admitted,
    Denied { client: String, method: String },
}

/// Only `method` matters; absent or `null` reads as empty.
#[derive(Debug, Deserialize)]
struct RpcCall {
    #[serde(default)]
    method: Option<String>,
}

/// State for the admission middleware.
#[derive(Debug)]
pub struct AdmissionState {
    pub limiter: Arc<MethodRateLimiter>,
    pub client_param: String,
    pub max_body_bytes: usize,
}

impl AdmissionState {
    pub fn new(limiter: Arc<MethodRateLimiter>, config: &RateLimitConfig) -> Self {
        Self {
            limiter,
            client_param: config.client_param.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Run the admission check, handing the (re-assembled) request back.
    ///
    /// Anonymous requests are admitted without touching the body.
    pub async fn inspect(
        &self,
        request: Request<Body>,
    ) -> Result<(Request<Body>, Verdict), AdmissionError> {
        let client = client_identity(request.uri(), &self.client_param);
        if client.is_empty() {
            return Ok((request, Verdict::Admitted));
        }

        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(AdmissionError::BodyRead)?;
        let call: RpcCall = serde_json::from_slice(&bytes)?;
        let method = call.method.unwrap_or_default();

        let admitted = self.limiter.allow(&client, &method)?;
        let request = Request::from_parts(parts, Body::from(bytes));

        if admitted {
            Ok((request, Verdict::Admitted))
        } else {
            Ok((
                request,
                Verdict::Denied { client, method },
            ))
        }
    }
}

/// First value of the identity query parameter, or empty when absent.
pub fn client_identity(uri: &Uri, param: &str) -> String {
    uri.query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(name, _)| name == param)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}

/// Middleware gating every request on the rate limiter.
pub async fn admission_middleware(
    State(state): State<Arc<AdmissionState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    match state.inspect(request).await {
        Ok((request, Verdict::Admitted)) => next.run(request).await,
        Ok((_, Verdict::Denied { client, method: call })) => {
            tracing::warn!(
                client = %client,
                call = %call,
                method = %method,
                path = %path,
                remote = %remote,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(&call);
            ProxyError::RateLimited.into_response()
        }
        Err(e) => {
            tracing::error!(method = %method, path = %path, remote = %remote, error = %e, "Error checking rate limit");
            ProxyError::Admission(e).into_response()
        }
    }
}
