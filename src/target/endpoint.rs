use crate::error::{ClusterError, Result};
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Method-scoped fallback mode (`false`, `force...`, or anything else for fail-fast)
pub const MOCK_KEY: &str = "mock";
/// Failure percentage (0-100) at which the breaker trips
pub const ERROR_RATE_THRESHOLD_KEY: &str = "error_rate_threshold";
/// Concurrency threshold; only decides whether the breaker is consulted
pub const CONCURRENCY_THRESHOLD_KEY: &str = "concurrency_threshold";

/// Default for every method parameter
pub const DEFAULT_PARAMETER: &str = "false";

/// Identity and configuration of the remote service an invoker is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    url: Url,
    parameters: HashMap<String, String>,
}

impl ServiceEndpoint {
    /// Parse an endpoint URL such as `http://10.0.0.1:8080/com.example.DemoService?mock=fail:return+null`
    pub fn parse(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| ClusterError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

        if url.host_str().is_none() {
            return Err(ClusterError::InvalidEndpoint(format!(
                "{}: missing host",
                endpoint
            )));
        }

        let service = url.path().trim_matches('/');
        if service.is_empty() {
            return Err(ClusterError::InvalidEndpoint(format!(
                "{}: missing service path",
                endpoint
            )));
        }

        let parameters = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self { url, parameters })
    }

    /// Overlay explicit parameters on top of those found in the URL query
    pub fn with_parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters
            .extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Scheme, host and port without path or query
    pub fn base_url(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Service identity, used to key aggregated metrics
    pub fn service_interface(&self) -> &str {
        self.url.path().trim_matches('/')
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Look up `{method}.{key}`, then `{key}`, then fall back to `default`.
    /// The returned value is trimmed.
    pub fn method_parameter(&self, method: &str, key: &str, default: &str) -> String {
        self.parameters
            .get(&format!("{}.{}", method, key))
            .or_else(|| self.parameters.get(key))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| default.to_string())
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let endpoint =
            ServiceEndpoint::parse("http://127.0.0.1:8080/com.example.DemoService?mock=force")
                .unwrap();
        assert_eq!(endpoint.service_interface(), "com.example.DemoService");
        assert_eq!(endpoint.base_url(), "http://127.0.0.1:8080");
        assert_eq!(endpoint.parameter(MOCK_KEY), Some("force"));
    }

    #[test]
    fn test_parse_rejects_missing_service() {
        assert!(ServiceEndpoint::parse("http://127.0.0.1:8080/").is_err());
        assert!(ServiceEndpoint::parse("not a url").is_err());
    }

    #[test]
    fn test_method_parameter_lookup_order() {
        let endpoint = ServiceEndpoint::parse("http://localhost:8080/demo?mock=fail")
            .unwrap()
            .with_parameters([("sayHello.mock", " force:return 1 ")]);

        assert_eq!(
            endpoint.method_parameter("sayHello", MOCK_KEY, DEFAULT_PARAMETER),
            "force:return 1"
        );
        assert_eq!(
            endpoint.method_parameter("other", MOCK_KEY, DEFAULT_PARAMETER),
            "fail"
        );
        assert_eq!(
            endpoint.method_parameter("other", ERROR_RATE_THRESHOLD_KEY, DEFAULT_PARAMETER),
            "false"
        );
    }

    #[test]
    fn test_explicit_parameters_override_query() {
        let endpoint = ServiceEndpoint::parse("http://localhost:8080/demo?mock=fail")
            .unwrap()
            .with_parameters([("mock", "false")]);
        assert_eq!(endpoint.parameter(MOCK_KEY), Some("false"));
    }
}
