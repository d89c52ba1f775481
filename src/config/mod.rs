use crate::circuit_breaker::BreakerConfig;
use crate::error::{ClusterError, Result};
use crate::target::ServiceEndpoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Coordination store; without it breaker counts stay process-local
    #[serde(default)]
    pub coordination: Option<CoordinationConfig>,
    /// Breaker timing
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Services to decorate
    pub services: Vec<ServiceConfig>,
}

/// Coordination store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Store endpoints, tried in order
    pub endpoints: Vec<String>,
    /// Bound on connect, read and write
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    /// Prefix of the aggregated metrics key; the service interface is appended
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// One decorated service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service URL, e.g. `http://10.0.0.1:8080/com.example.DemoService?mock=fail:return+null`
    pub endpoint: String,
    /// Real call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Parameters overlaid on the URL query (`mock`, `sayHello.error_rate_threshold`, ...)
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Services used as fallback targets, first one wins
    #[serde(default)]
    pub fallback_endpoints: Vec<String>,
}

fn default_session_timeout() -> u64 {
    30
}

fn default_key_prefix() -> String {
    "mock-cluster:metrics:".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl CoordinationConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl ServiceConfig {
    /// Parsed endpoint with explicit parameters applied
    pub fn service_endpoint(&self) -> Result<ServiceEndpoint> {
        Ok(ServiceEndpoint::parse(&self.endpoint)?.with_parameters(self.parameters.clone()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ClusterConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClusterError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ClusterError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(ClusterError::Config(
                "At least one service must be configured".to_string(),
            ));
        }

        for service in &self.services {
            service.service_endpoint()?;

            if service.timeout_secs == 0 {
                return Err(ClusterError::Config(format!(
                    "Timeout must be > 0 for service: {}",
                    service.endpoint
                )));
            }

            for fallback in &service.fallback_endpoints {
                ServiceEndpoint::parse(fallback)?;
            }
        }

        if self.breaker.evaluation_window_secs == 0 {
            return Err(ClusterError::Config(
                "Breaker evaluation window must be > 0".to_string(),
            ));
        }
        if self.breaker.upload_interval_secs == 0 {
            return Err(ClusterError::Config(
                "Breaker upload interval must be > 0".to_string(),
            ));
        }
        if self.breaker.initial_backoff_exponent == 0 {
            return Err(ClusterError::Config(
                "Breaker backoff exponent must be > 0".to_string(),
            ));
        }

        if let Some(coordination) = &self.coordination {
            if coordination.endpoints.is_empty() {
                return Err(ClusterError::Config(
                    "Coordination store needs at least one endpoint".to_string(),
                ));
            }
            if coordination.session_timeout_secs == 0 {
                return Err(ClusterError::Config(
                    "Coordination session timeout must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
