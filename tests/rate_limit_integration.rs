//! Admission control through the full server stack.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use latency_balancer::store::InMemoryLatencyStore;

mod common;

const LIMITED: &str = r#"{"jsonrpc":"2.0","id":1,"method":"eth_getBlockByNumber","params":["latest",false]}"#;
const UNLIMITED: &str = r#"{"jsonrpc":"2.0","id":1,"method":"eth_call","params":[]}"#;

async fn setup(burst: u32) -> (std::net::SocketAddr, latency_balancer::Shutdown) {
    let addr = common::start_backend("node", Arc::new(AtomicU64::new(0))).await;
    let mut config = common::test_config(&[addr]);
    config.rate_limit.burst = burst;
    config.rate_limit.refill_rate = 0.001;
    common::start_balancer(config, Arc::new(InMemoryLatencyStore::new())).await
}

#[tokio::test]
async fn test_limited_method_is_rejected_after_burst() {
    let (proxy, shutdown) = setup(3).await;
    let client = common::client();
    let url = format!("http://{proxy}/?Id=node-42");

    for _ in 0..3 {
        let res = client.post(&url).body(LIMITED).send().await.unwrap();
        assert_eq!(res.status(), 200);
        // The inspected body still reaches the backend.
        assert_eq!(res.text().await.unwrap(), format!("node:{LIMITED}"));
    }
    let res = client.post(&url).body(LIMITED).send().await.unwrap();
    assert_eq!(res.status(), 429);

    shutdown.trigger();
}

#[tokio::test]
async fn test_anonymous_and_unlisted_calls_are_never_limited() {
    let (proxy, shutdown) = setup(1).await;
    let client = common::client();

    for _ in 0..10 {
        let res = client.post(format!("http://{proxy}/")).body(LIMITED).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }
    for _ in 0..10 {
        let res = client
            .post(format!("http://{proxy}/?Id=node-42"))
            .body(UNLIMITED)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_body_is_internal_error() {
    let (proxy, shutdown) = setup(5).await;

    let res = common::client()
        .post(format!("http://{proxy}/?Id=node-42"))
        .body("{\"method\":")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);

    shutdown.trigger();
}

#[tokio::test]
async fn test_disabled_limiter_admits_everything() {
    let addr = common::start_backend("node", Arc::new(AtomicU64::new(0))).await;
    let mut config = common::test_config(&[addr]);
    config.rate_limit.enabled = false;
    let (proxy, shutdown) = common::start_balancer(config, Arc::new(InMemoryLatencyStore::new())).await;

    let client = common::client();
    for _ in 0..5 {
        let res = client
            .post(format!("http://{proxy}/?Id=node-42"))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    shutdown.trigger();
}
