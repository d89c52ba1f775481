use super::endpoint::ServiceEndpoint;
use super::{CallDescriptor, CallResult, CallTarget, Reply};
use crate::error::{ClusterError, Failure, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Real target reached over HTTP.
///
/// A call is sent as `POST {base}/{service}/{method}` with a JSON body holding the
/// arguments and attachments. 2xx replies carry the result value, 4xx replies are
/// business failures, everything else is a system failure.
pub struct HttpTarget {
    endpoint: ServiceEndpoint,
    client: reqwest::Client,
    destroyed: AtomicBool,
}

impl HttpTarget {
    /// Create a new HTTP target
    pub fn new(endpoint: ServiceEndpoint, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClusterError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            client,
            destroyed: AtomicBool::new(false),
        })
    }

    fn call_url(&self, method: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.base_url(),
            self.endpoint.service_interface(),
            method
        )
    }
}

#[async_trait]
impl CallTarget for HttpTarget {
    fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    async fn invoke(&self, call: &CallDescriptor) -> CallResult {
        if !self.is_available() {
            return Err(Failure::System(format!(
                "target {} has been destroyed",
                self.endpoint
            )));
        }

        let url = self.call_url(call.method());
        debug!(url = %url, method = call.method(), "Sending call");

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "arguments": call.arguments(),
                "attachments": call.attachments(),
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Failure::System(format!("call to {} timed out: {}", url, e))
                } else {
                    Failure::System(format!("call to {} failed: {}", url, e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Failure::System(format!("failed to read reply from {}: {}", url, e)))?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Reply::value(Value::Null));
            }
            return serde_json::from_str(&body)
                .map(Reply::value)
                .map_err(|e| Failure::System(format!("malformed reply from {}: {}", url, e)));
        }

        let message = if body.is_empty() {
            status.to_string()
        } else {
            body
        };

        if status.is_client_error() {
            Err(Failure::Business(message))
        } else {
            warn!(url = %url, status = status.as_u16(), "Remote call failed");
            Err(Failure::System(format!("{} returned {}: {}", url, status, message)))
        }
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            debug!(endpoint = %self.endpoint, "HTTP target destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    async fn target_for(server: &MockServer) -> HttpTarget {
        let endpoint = ServiceEndpoint::parse(&format!("{}/com.example.DemoService", server.uri()))
            .unwrap();
        HttpTarget::new(endpoint, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_success_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/com.example.DemoService/sayHello"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"greeting": "hi"})))
            .mount(&server)
            .await;

        let target = target_for(&server).await;
        let reply = target
            .invoke(&CallDescriptor::new("sayHello", vec![json!("bob")]))
            .await
            .unwrap();
        assert_eq!(reply.value, json!({"greeting": "hi"}));
    }

    #[tokio::test]
    async fn test_client_error_is_business_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid name"))
            .mount(&server)
            .await;

        let target = target_for(&server).await;
        let err = target
            .invoke(&CallDescriptor::new("sayHello", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err, Failure::Business("invalid name".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_is_system_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let target = target_for(&server).await;
        let err = target
            .invoke(&CallDescriptor::new("sayHello", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Failure::System(_)));
    }

    #[tokio::test]
    async fn test_destroyed_target_rejects_calls() {
        let server = MockServer::start().await;
        let target = target_for(&server).await;
        target.destroy();

        assert!(!target.is_available());
        let err = target
            .invoke(&CallDescriptor::new("sayHello", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Failure::System(_)));
    }
}
