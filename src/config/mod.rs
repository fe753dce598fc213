//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!     → handed to startup, which builds the services
//! ```
//!
//! # Design Decisions
//! - Config is static; backends and limits are fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BalancerConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig, StoreConfig, StoreKind,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
