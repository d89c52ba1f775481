use crate::circuit_breaker::Decision;
use crate::error::{ClusterError, Result};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service holding the Prometheus recorder
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Create a new metrics service
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ClusterError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register all metrics with descriptions
pub fn register_metrics() {
    describe_counter!(
        "mock_cluster_calls_total",
        "Total number of calls received, by fallback mode"
    );
    describe_counter!(
        "mock_cluster_breaker_decisions_total",
        "Total number of breaker routing decisions"
    );
    describe_counter!(
        "mock_cluster_fallback_invocations_total",
        "Total number of fallback executions, by reason"
    );
    describe_counter!(
        "mock_cluster_metric_uploads_total",
        "Total number of merges into the coordination store, by outcome"
    );

    debug!("All metrics registered with descriptions");
}

/// Record an incoming call
pub fn record_call(service: &str, mode: &str) {
    let labels = [
        ("service", service.to_string()),
        ("mode", mode.to_string()),
    ];
    counter!("mock_cluster_calls_total", &labels).increment(1);
}

/// Record a breaker decision
pub fn record_breaker_decision(service: &str, decision: Decision) {
    let labels = [
        ("service", service.to_string()),
        ("decision", decision.as_str().to_string()),
    ];
    counter!("mock_cluster_breaker_decisions_total", &labels).increment(1);
}

/// Record a fallback execution
pub fn record_fallback(service: &str, reason: &str) {
    let labels = [
        ("service", service.to_string()),
        ("reason", reason.to_string()),
    ];
    counter!("mock_cluster_fallback_invocations_total", &labels).increment(1);
}

/// Record a coordination store merge
pub fn record_upload(service: &str, success: bool) {
    let labels = [
        ("service", service.to_string()),
        ("outcome", if success { "ok" } else { "error" }.to_string()),
    ];
    counter!("mock_cluster_metric_uploads_total", &labels).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_service_creation() {
        // The recorder may already be installed by another test
        match MetricsService::new() {
            Ok(service) => {
                record_call("demo.Service", "force");
                assert!(service.render().contains("mock_cluster_calls_total"));
            }
            Err(e) => {
                assert!(e.to_string().contains("recorder"));
            }
        }
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_call("demo.Service", "fail_fast");
        record_breaker_decision("demo.Service", Decision::Open);
        record_fallback("demo.Service", "breaker_open");
        record_upload("demo.Service", false);
    }
}
