//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → admission.rs (client id from query, call method from JSON body)
//!     → rate_limit.rs (token bucket per client + method)
//!     → Pass to backend selection
//! ```
//!
//! # Design Decisions
//! - Anonymous traffic is never limited
//! - Only methods on the configured allow-list are limited
//! - Failing to evaluate the limiter is a server error, not a rejection

pub mod admission;
pub mod rate_limit;

pub use admission::{admission_middleware, AdmissionError, AdmissionState, Verdict};
pub use rate_limit::MethodRateLimiter;
