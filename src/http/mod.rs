//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, catch-all handler)
//!     → [admission middleware] (rate limiting)
//!     → [backend pool picks server]
//!     → dispatch.rs (forward, stream back, record latency)
//!     → request.rs (rewrite onto backend, hop-by-hop headers)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod request;
pub mod server;

pub use dispatch::Dispatcher;
pub use request::{RequestContext, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
