//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Connect store (ping) → Register backends → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → broadcast → Stop accepting → Drain connections → Drop services
//! ```
//!
//! # Design Decisions
//! - Ordered startup: store first, then registry, then listener
//! - The store connection lives exactly as long as the services holding it

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{bootstrap, connect_store, Services, StartupError};
