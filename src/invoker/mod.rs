//! Call routing.
//!
//! [`FallbackInvoker`] decorates one real target. Per call it reads the method-scoped
//! `mock` parameter and either passes the call through, forces the fallback, or routes it
//! through the circuit breaker with fallback on system failures.

use crate::circuit_breaker::{Admission, CircuitBreaker, Thresholds};
use crate::fallback::FallbackExecutor;
use crate::metrics;
use crate::target::endpoint::{
    CONCURRENCY_THRESHOLD_KEY, DEFAULT_PARAMETER, ERROR_RATE_THRESHOLD_KEY, MOCK_KEY,
};
use crate::target::{CallDescriptor, CallResult, CallTarget, ServiceEndpoint, TargetResolver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a method's calls are routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Straight to the real target
    Disabled,
    /// Always the fallback, never the real target
    Force,
    /// Real target guarded by the breaker, fallback on system failure
    FailFast,
}

impl FallbackMode {
    /// Empty or `false` (any case) disables, a `force` prefix forces, anything else is
    /// fail-fast.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("false") {
            FallbackMode::Disabled
        } else if value.starts_with("force") {
            FallbackMode::Force
        } else {
            FallbackMode::FailFast
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackMode::Disabled => "disabled",
            FallbackMode::Force => "force",
            FallbackMode::FailFast => "fail_fast",
        }
    }
}

/// Circuit-breaking decorator around one real target
pub struct FallbackInvoker {
    resolver: Arc<dyn TargetResolver>,
    target: Arc<dyn CallTarget>,
    breaker: CircuitBreaker,
    fallback: FallbackExecutor,
    destroyed: AtomicBool,
}

impl FallbackInvoker {
    pub fn new(
        resolver: Arc<dyn TargetResolver>,
        target: Arc<dyn CallTarget>,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            fallback: FallbackExecutor::new(resolver.clone()),
            resolver,
            target,
            breaker,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Route one call. `call` is never modified; fallback targets receive a marked copy.
    pub async fn invoke(&self, call: &CallDescriptor) -> CallResult {
        let endpoint = self.resolver.endpoint();
        let mode = FallbackMode::parse(&endpoint.method_parameter(
            call.method(),
            MOCK_KEY,
            DEFAULT_PARAMETER,
        ));
        metrics::record_call(endpoint.service_interface(), mode.as_str());

        match mode {
            FallbackMode::Disabled => self.target.invoke(call).await,
            FallbackMode::Force => {
                info!(
                    method = call.method(),
                    endpoint = %endpoint,
                    "Forced fallback enabled"
                );
                metrics::record_fallback(endpoint.service_interface(), "forced");
                self.fallback.execute(call, None).await
            }
            FallbackMode::FailFast => self.invoke_fail_fast(call).await,
        }
    }

    async fn invoke_fail_fast(&self, call: &CallDescriptor) -> CallResult {
        let endpoint = self.resolver.endpoint();
        let thresholds = Thresholds::parse(
            &endpoint.method_parameter(call.method(), ERROR_RATE_THRESHOLD_KEY, DEFAULT_PARAMETER),
            &endpoint.method_parameter(call.method(), CONCURRENCY_THRESHOLD_KEY, DEFAULT_PARAMETER),
        );

        let result = if thresholds.is_configured() {
            match self.breaker.before(thresholds).await {
                Admission::Rejected => {
                    debug!(method = call.method(), "Breaker open, using fallback");
                    metrics::record_fallback(endpoint.service_interface(), "breaker_open");
                    return self.fallback.execute(call, None).await;
                }
                Admission::Admitted(permit) => {
                    let result = self.target.invoke(call).await;
                    match &result {
                        Ok(_) => permit.record_success(),
                        Err(_) => permit.record_failure(),
                    }
                    result
                }
            }
        } else {
            self.target.invoke(call).await
        };

        match result {
            Err(failure) if !failure.is_business() => {
                warn!(
                    method = call.method(),
                    endpoint = %endpoint,
                    error = %failure,
                    "Call failed, using fallback"
                );
                metrics::record_fallback(endpoint.service_interface(), "call_failed");
                self.fallback.execute(call, Some(&failure)).await
            }
            other => other,
        }
    }

    /// Whether the service can currently take calls
    pub fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire) && self.resolver.is_available()
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        self.resolver.endpoint()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Release the real target. Later calls still route, but the target decides how it
    /// treats them.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            info!(endpoint = %self.endpoint(), "Destroying invoker");
            self.target.destroy();
        }
    }
}

impl std::fmt::Debug for FallbackInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackInvoker")
            .field("endpoint", &self.endpoint().to_string())
            .field("breaker", &self.breaker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fallback_mode() {
        assert_eq!(FallbackMode::parse(""), FallbackMode::Disabled);
        assert_eq!(FallbackMode::parse("  "), FallbackMode::Disabled);
        assert_eq!(FallbackMode::parse("false"), FallbackMode::Disabled);
        assert_eq!(FallbackMode::parse("FALSE"), FallbackMode::Disabled);
        assert_eq!(FallbackMode::parse("force"), FallbackMode::Force);
        assert_eq!(FallbackMode::parse("force:return null"), FallbackMode::Force);
        assert_eq!(FallbackMode::parse("fail:return null"), FallbackMode::FailFast);
        assert_eq!(FallbackMode::parse("true"), FallbackMode::FailFast);
        assert_eq!(FallbackMode::parse("Force"), FallbackMode::FailFast);
    }
}
