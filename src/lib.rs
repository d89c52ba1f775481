pub mod circuit_breaker;
pub mod config;
pub mod coordination;
pub mod error;
pub mod fallback;
pub mod invoker;
pub mod metrics;
pub mod target;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{ClusterConfig, ServiceConfig};
use crate::coordination::{CoordinationStore, MemoryStore, MetricsAggregator, RedisStore};
use crate::error::Result;
use crate::invoker::FallbackInvoker;
use crate::target::{CallTarget, HttpTarget, ServiceEndpoint, StaticResolver};
use std::sync::Arc;
use tracing::{info, warn};

/// Connect the configured coordination store.
///
/// Returns `None` when no store is configured. An unreachable store is replaced by an
/// in-process [`MemoryStore`] so breaker statistics keep working within this process.
pub async fn connect_store(config: &ClusterConfig) -> Option<Arc<dyn CoordinationStore>> {
    let coordination = config.coordination.as_ref()?;

    match RedisStore::connect(&coordination.endpoints, coordination.session_timeout()).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(
                error = %e,
                "Coordination store unavailable, keeping breaker metrics in process"
            );
            Some(Arc::new(MemoryStore::new()))
        }
    }
}

/// Build the invoker for one configured service
pub fn build_invoker(
    config: &ClusterConfig,
    service: &ServiceConfig,
    store: Option<Arc<dyn CoordinationStore>>,
) -> Result<FallbackInvoker> {
    let endpoint = service.service_endpoint()?;
    let target: Arc<dyn CallTarget> = Arc::new(HttpTarget::new(endpoint.clone(), service.timeout())?);

    let mut resolver = StaticResolver::new(endpoint.clone()).with_target(target.clone());
    for fallback in &service.fallback_endpoints {
        let fallback_endpoint = ServiceEndpoint::parse(fallback)?;
        resolver = resolver.with_fallback(Arc::new(HttpTarget::new(
            fallback_endpoint,
            service.timeout(),
        )?));
    }

    let aggregator = match (store, &config.coordination) {
        (Some(store), Some(coordination)) => Some(MetricsAggregator::new(
            store,
            &coordination.key_prefix,
            endpoint.service_interface(),
        )),
        _ => None,
    };

    let breaker = CircuitBreaker::new(
        endpoint.service_interface(),
        config.breaker.clone(),
        aggregator,
    );

    info!(
        endpoint = %endpoint,
        fallbacks = service.fallback_endpoints.len(),
        "Built fallback invoker"
    );

    Ok(FallbackInvoker::new(Arc::new(resolver), target, breaker))
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_cluster=debug".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
