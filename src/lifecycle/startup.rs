//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the latency store and verify it answers
//! - Register the configured backends
//! - Build the rate limiter and backend pool
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BalancerConfig, ConfigError, StoreConfig, StoreKind};
use crate::load_balancer::{BackendPool, BackendRegistry, RegistryError};
use crate::security::MethodRateLimiter;
use crate::store::{InMemoryLatencyStore, LatencyStore, RedisLatencyStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("latency store unreachable: {0}")]
    StoreUnreachable(#[source] StoreError),
    #[error("backend registration failed: {0}")]
    Registration(#[from] RegistryError),
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Long-lived services shared by the request path.
///
/// Built once at startup and dropped when the server stops, which releases the
/// store connection.
pub struct Services {
    pub store: Arc<dyn LatencyStore>,
    pub registry: Arc<BackendRegistry>,
    pub pool: Arc<BackendPool>,
    /// `None` when rate limiting is disabled.
    pub limiter: Option<Arc<MethodRateLimiter>>,
}

impl Services {
    /// Register every configured backend against `store` and build the rest.
    pub async fn initialize(
        config: &BalancerConfig,
        store: Arc<dyn LatencyStore>,
    ) -> Result<Self, StartupError> {
        let registry = Arc::new(BackendRegistry::new(store.clone()));
        for endpoint in &config.backends {
            registry.add(endpoint).await?;
        }
        if registry.is_empty() {
            tracing::warn!("No backends configured; every request will get 503");
        }

        let pool = Arc::new(BackendPool::new(registry.clone(), store.clone()));

        let limiter = if config.rate_limit.enabled {
            tracing::info!(
                refill_rate = config.rate_limit.refill_rate,
                burst = config.rate_limit.burst,
                methods = ?config.rate_limit.methods,
                "Rate limiting enabled"
            );
            Some(Arc::new(MethodRateLimiter::from_config(&config.rate_limit)))
        } else {
            None
        };

        Ok(Self {
            store,
            registry,
            pool,
            limiter,
        })
    }
}

/// Open the configured store and ping it within the configured deadline.
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn LatencyStore>, StartupError> {
    let ping_timeout = Duration::from_secs(config.ping_timeout_secs);

    let store: Arc<dyn LatencyStore> = match config.kind {
        StoreKind::Redis => Arc::new(
            RedisLatencyStore::connect(
                &config.url,
                config.key.clone(),
                ping_timeout,
                Duration::from_millis(config.op_timeout_ms),
            )
            .await
            .map_err(StartupError::StoreUnreachable)?,
        ),
        StoreKind::Memory => {
            tracing::warn!("Using in-process latency store; latencies are not shared between instances");
            Arc::new(InMemoryLatencyStore::new())
        }
    };

    store
        .ping(ping_timeout)
        .await
        .map_err(StartupError::StoreUnreachable)?;
    Ok(store)
}

/// Connect the store and initialize every service.
pub async fn bootstrap(config: &BalancerConfig) -> Result<Services, StartupError> {
    let store = connect_store(&config.store).await?;
    Services::initialize(config, store).await
}
