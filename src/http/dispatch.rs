//! Forwarding to the selected backend, with latency write-back.
//!
//! The elapsed time is taken when the response body has been fully handed to the
//! client (or the client went away), not when the response head arrives, so slow
//! streaming backends are measured as slow. A request abandoned before the head
//! arrives (request timeout, client disconnect) is measured up to that point.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use http_body::{Body as HttpBody, Frame, SizeHint};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use crate::error::ProxyError;
use crate::http::request::{strip_hop_by_hop, upstream_request, RequestContext};
use crate::load_balancer::backend::Backend;
use crate::observability::metrics;
use crate::store::LatencyStore;

/// Logged status for a request dropped before the backend answered.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Forwards requests and reports the measured latency to the shared store.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client<HttpConnector, Body>,
    store: Arc<dyn LatencyStore>,
    writes: PendingWrites,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn LatencyStore>, connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            store,
            writes: PendingWrites::default(),
        }
    }

    /// Proxy `request` to `backend`, streaming back the backend's true status.
    ///
    /// A transport failure becomes `502`; its elapsed time is recorded like any
    /// other outcome. If this future is dropped while waiting for the backend, the
    /// latency is still recorded.
    pub async fn forward(
        &self,
        backend: Arc<Backend>,
        request: Request<Body>,
        ctx: RequestContext,
    ) -> Response {
        let start = Instant::now();

        let (parts, body) = request.into_parts();
        let upstream = match upstream_request(parts, body, &backend, ctx.remote) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(request_id = %ctx.request_id, backend = %backend, error = %e, "Failed to build upstream request");
                return ProxyError::Upstream(e.to_string()).into_response();
            }
        };

        let mut guard = CompletionGuard::new(Completion {
            store: self.store.clone(),
            writes: self.writes.clone(),
            backend,
            start,
            status: CLIENT_CLOSED_REQUEST,
            ctx,
        });

        match self.client.request(upstream).await {
            Ok(response) => {
                guard.set_status(response.status().as_u16());
                let (mut parts, body): (_, hyper::body::Incoming) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                let body = InstrumentedBody {
                    inner: Body::new(body),
                    completion: guard,
                };
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                if let Some(completion) = guard.0.as_ref() {
                    tracing::error!(
                        request_id = %completion.ctx.request_id,
                        backend = %completion.backend,
                        error = %e,
                        "Upstream error"
                    );
                }
                guard.set_status(StatusCode::BAD_GATEWAY.as_u16());
                guard.fire();
                ProxyError::Upstream(e.to_string()).into_response()
            }
        }
    }

    /// Wait up to `limit` for latency writes still in flight. Returns how many
    /// were pending.
    pub async fn drain_writes(&self, limit: Duration) -> usize {
        self.writes.drain(limit).await
    }
}

/// Store writes spawned after responses, kept so shutdown can wait for them.
#[derive(Clone, Default)]
struct PendingWrites(Arc<Mutex<JoinSet<()>>>);

impl PendingWrites {
    fn spawn(&self, runtime: &Handle, write: impl Future<Output = ()> + Send + 'static) {
        let mut set = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        while set.try_join_next().is_some() {}
        set.spawn_on(write, runtime);
    }

    async fn drain(&self, limit: Duration) -> usize {
        let mut set = std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner));
        let pending = set.len();
        let joined = tokio::time::timeout(limit, async {
            while set.join_next().await.is_some() {}
        })
        .await;
        if joined.is_err() {
            tracing::warn!(pending = set.len(), "Latency writes still pending at shutdown, abandoning");
            set.abort_all();
        }
        pending
    }
}

/// Bookkeeping run exactly once when a dispatched request is done.
struct Completion {
    store: Arc<dyn LatencyStore>,
    writes: PendingWrites,
    backend: Arc<Backend>,
    start: Instant,
    status: u16,
    ctx: RequestContext,
}

impl Completion {
    fn finish(self) {
        let duration = self.start.elapsed();
        let endpoint = self.backend.endpoint().to_string();

        tracing::info!(
            request_id = %self.ctx.request_id,
            method = %self.ctx.method,
            path = %self.ctx.path,
            version = ?self.ctx.version,
            remote = %self.ctx.remote_display(),
            status = self.status,
            duration = ?duration,
            backend = %endpoint,
            "Completed request"
        );
        metrics::record_request(self.ctx.method.as_str(), self.status, &endpoint, self.start);
        metrics::record_backend_latency(&endpoint, duration);

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(backend = %endpoint, "No runtime available, latency not recorded");
            return;
        };
        let store = self.store;
        self.writes.spawn(&runtime, async move {
            if let Err(e) = store.set_latency(&endpoint, duration).await {
                tracing::warn!(backend = %endpoint, error = %e, "Failed to record backend latency");
                metrics::record_store_error("set_latency");
            }
        });
    }
}

/// Fires its [`Completion`] when dropped, unless it already fired.
struct CompletionGuard(Option<Completion>);

impl CompletionGuard {
    fn new(completion: Completion) -> Self {
        Self(Some(completion))
    }

    fn set_status(&mut self, status: u16) {
        if let Some(completion) = self.0.as_mut() {
            completion.status = status;
        }
    }

    fn fire(&mut self) {
        if let Some(completion) = self.0.take() {
            completion.finish();
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Response body that fires its completion at end of stream, on error, or on drop.
struct InstrumentedBody {
    inner: Body,
    completion: CompletionGuard,
}

impl HttpBody for InstrumentedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        if matches!(polled, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            self.completion.fire();
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryLatencyStore, LatencySnapshot, StoreError};
    use axum::http::Method;

    /// Memory store whose writes take a while to land.
    struct SlowStore {
        inner: InMemoryLatencyStore,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl LatencyStore for SlowStore {
        async fn ping(&self, timeout: Duration) -> Result<(), StoreError> {
            self.inner.ping(timeout).await
        }

        async fn set_latency(&self, endpoint: &str, latency: Duration) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.set_latency(endpoint, latency).await
        }

        async fn all_latencies(&self) -> Result<LatencySnapshot, StoreError> {
            self.inner.all_latencies().await
        }
    }

    /// Backend that accepts connections and never answers.
    async fn start_silent_backend() -> Arc<Backend> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        Arc::new(Backend::parse(&format!("http://{addr}")).unwrap())
    }

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: "test".into(),
            method: Method::POST,
            path: "/".into(),
            version: axum::http::Version::HTTP_11,
            remote: None,
        }
    }

    async fn wait_for_write(store: &InMemoryLatencyStore, endpoint: &str, initial: &str) -> String {
        for _ in 0..100 {
            if let Some(v) = store.get_raw(endpoint) {
                if v != initial {
                    return v;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("latency for {endpoint} was never written");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_bad_gateway_and_recorded() {
        // Bind then drop to get a port nobody listens on.
        let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let backend = Arc::new(Backend::parse(&format!("http://{addr}")).unwrap());

        let store = Arc::new(InMemoryLatencyStore::new());
        store.set_raw(backend.endpoint(), "unset");
        let dispatcher = Dispatcher::new(store.clone(), Duration::from_secs(1));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = dispatcher.forward(backend.clone(), request, ctx()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let written = wait_for_write(&store, backend.endpoint(), "unset").await;
        assert!(crate::store::parse_duration(&written).is_ok());
    }

    #[tokio::test]
    async fn test_latency_written_after_body_consumed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/",
            axum::routing::any(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let backend = Arc::new(Backend::parse(&format!("http://{addr}")).unwrap());
        let store = Arc::new(InMemoryLatencyStore::new());
        store.set_raw(backend.endpoint(), "unset");
        let dispatcher = Dispatcher::new(store.clone(), Duration::from_secs(1));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = dispatcher.forward(backend.clone(), request, ctx()).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"short and stout");

        let written = wait_for_write(&store, backend.endpoint(), "unset").await;
        assert!(crate::store::parse_duration(&written).is_ok());
    }

    #[tokio::test]
    async fn test_abandoned_request_is_still_recorded() {
        let backend = start_silent_backend().await;
        let store = Arc::new(InMemoryLatencyStore::new());
        store.set_raw(backend.endpoint(), "0s");
        let dispatcher = Dispatcher::new(store.clone(), Duration::from_secs(1));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let forwarded = tokio::time::timeout(
            Duration::from_millis(200),
            dispatcher.forward(backend.clone(), request, ctx()),
        )
        .await;
        assert!(forwarded.is_err());

        let written = wait_for_write(&store, backend.endpoint(), "0s").await;
        let latency = crate::store::parse_duration(&written).unwrap();
        assert!(latency >= Duration::from_millis(150), "recorded {latency:?}");
    }

    #[tokio::test]
    async fn test_drain_waits_for_pending_writes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route("/", axum::routing::any(|| async { "ok" }));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let backend = Arc::new(Backend::parse(&format!("http://{addr}")).unwrap());
        let store = Arc::new(SlowStore {
            inner: InMemoryLatencyStore::new(),
            delay: Duration::from_millis(200),
        });
        store.inner.set_raw(backend.endpoint(), "unset");
        let dispatcher = Dispatcher::new(store.clone(), Duration::from_secs(1));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = dispatcher.forward(backend.clone(), request, ctx()).await;
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

        assert_eq!(dispatcher.drain_writes(Duration::from_secs(2)).await, 1);
        assert_ne!(store.inner.get_raw(backend.endpoint()).as_deref(), Some("unset"));
        assert_eq!(dispatcher.drain_writes(Duration::from_secs(2)).await, 0);
    }
}
