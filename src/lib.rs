//! Latency-aware JSON-RPC load balancer.
//!
//! Requests pass a per-client, per-method token bucket, then go to the backend
//! with the lowest last-observed latency. Latencies live in a store shared by
//! every balancer instance.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod security;
pub mod store;

pub use config::BalancerConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::{Services, Shutdown};
