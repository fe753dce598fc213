//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::any, Router};
use latency_balancer::config::{BalancerConfig, StoreKind};
use latency_balancer::store::{parse_duration, InMemoryLatencyStore, LatencyStore};
use latency_balancer::{HttpServer, Services, Shutdown};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[derive(Clone)]
struct MockBackend {
    name: &'static str,
    delay_ms: Arc<AtomicU64>,
}

async fn echo(State(backend): State<MockBackend>, body: String) -> String {
    let delay = backend.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    format!("{}:{}", backend.name, body)
}

/// Start a backend answering `"{name}:{request body}"` after `delay_ms`.
pub async fn start_backend(name: &'static str, delay_ms: Arc<AtomicU64>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/", any(echo))
        .route("/{*path}", any(echo))
        .with_state(MockBackend { name, delay_ms });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start a raw backend that always answers with the given status line and body.
#[allow(dead_code)]
pub async fn start_fixed_backend(status_line: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_line,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Defaults suitable for tests: memory store, loopback listener.
pub fn test_config(backends: &[SocketAddr]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.store.kind = StoreKind::Memory;
    config.backends = backends.iter().map(|a| format!("http://{a}")).collect();
    config
}

/// Start a balancer over `store`, returning its address and shutdown handle.
pub async fn start_balancer(
    config: BalancerConfig,
    store: Arc<InMemoryLatencyStore>,
) -> (SocketAddr, Shutdown) {
    let services = Services::initialize(&config, store).await.unwrap();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, services);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll the store until the latency for `endpoint` satisfies `accept`.
#[allow(dead_code)]
pub async fn wait_for_latency(
    store: &InMemoryLatencyStore,
    endpoint: &str,
    accept: impl Fn(Duration) -> bool,
) -> Duration {
    for _ in 0..200 {
        let snapshot = store.all_latencies().await.unwrap();
        if let Some(latency) = snapshot.get(endpoint).and_then(|v| parse_duration(v).ok()) {
            if accept(latency) {
                return latency;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("latency for {endpoint} never reached the expected value");
}
