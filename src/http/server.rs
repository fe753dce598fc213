//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (admission, timeout, request ID, tracing)
//! - Bind server to listener and shut down gracefully
//! - Select a backend per request and hand off to the dispatcher

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::BalancerConfig;
use crate::error::ProxyError;
use crate::http::dispatch::Dispatcher;
use crate::http::request::RequestContext;
use crate::lifecycle::startup::Services;
use crate::load_balancer::{BackendPool, SelectError};
use crate::observability::metrics;
use crate::security::{admission_middleware, AdmissionState};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BackendPool>,
    pub dispatcher: Dispatcher,
}

/// HTTP server for the balancer.
pub struct HttpServer {
    router: Router,
    config: BalancerConfig,
    services: Services,
    dispatcher: Dispatcher,
}

impl HttpServer {
    /// Create a new HTTP server from configuration and initialized services.
    pub fn new(config: BalancerConfig, services: Services) -> Self {
        let dispatcher = Dispatcher::new(
            services.store.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
        );
        let state = AppState {
            pool: services.pool.clone(),
            dispatcher: dispatcher.clone(),
        };
        let admission = services
            .limiter
            .as_ref()
            .map(|limiter| Arc::new(AdmissionState::new(limiter.clone(), &config.rate_limit)));

        let router = Self::build_router(&config, state, admission);
        Self {
            router,
            config,
            services,
            dispatcher,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &BalancerConfig,
        state: AppState,
        admission: Option<Arc<AdmissionState>>,
    ) -> Router {
        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        if let Some(admission) = admission {
            router = router.layer(axum::middleware::from_fn_with_state(
                admission,
                admission_middleware,
            ));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then flush pending latency writes
    /// and release the services.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.services.registry.len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        let flush_limit = Duration::from_millis(self.config.store.op_timeout_ms);
        let pending = self.dispatcher.drain_writes(flush_limit).await;
        tracing::debug!(pending, "Latency writes flushed");

        drop(self.services);
        tracing::info!("HTTP server stopped, latency store connection released");
        Ok(())
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Main proxy handler.
/// Selects the lowest-latency backend and forwards the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let ctx = RequestContext::from_request(&request);

    tracing::info!(
        request_id = %ctx.request_id,
        method = %ctx.method,
        path = %ctx.path,
        version = ?ctx.version,
        remote = %ctx.remote_display(),
        "Incoming request"
    );

    let backend = match state.pool.next_backend().await {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                remote = %ctx.remote_display(),
                error = %e,
                duration = ?start.elapsed(),
                "Error processing request"
            );
            if matches!(e, SelectError::Store(_)) {
                metrics::record_store_error("all_latencies");
            }
            let error = ProxyError::Selection(e);
            metrics::record_request(ctx.method.as_str(), error.status().as_u16(), "none", start);
            return error.into_response();
        }
    };

    state.dispatcher.forward(backend, request, ctx).await
}
