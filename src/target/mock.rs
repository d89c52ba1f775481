use super::endpoint::{ServiceEndpoint, MOCK_KEY};
use super::{CallDescriptor, CallResult, CallTarget, Reply};
use crate::error::Failure;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// What the default fallback target does for a method
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Reply with a canned value
    Return(Value),
    /// Raise a business failure with the given message (if any)
    Throw(Option<String>),
    /// No canned behavior is configured
    Unsupported(String),
}

impl MockBehavior {
    /// Interpret a `mock` parameter value. `force:` and `fail:` prefixes select the mode
    /// and are stripped here.
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim();
        let value = value
            .strip_prefix("force:")
            .or_else(|| value.strip_prefix("fail:"))
            .unwrap_or(value)
            .trim();

        if let Some(rest) = value.strip_prefix("return") {
            let rest = rest.trim();
            if rest.is_empty() {
                return MockBehavior::Return(Value::Null);
            }
            let parsed =
                serde_json::from_str(rest).unwrap_or_else(|_| Value::String(rest.to_string()));
            return MockBehavior::Return(parsed);
        }

        if let Some(rest) = value.strip_prefix("throw") {
            let rest = rest.trim();
            return MockBehavior::Throw((!rest.is_empty()).then(|| rest.to_string()));
        }

        MockBehavior::Unsupported(value.to_string())
    }
}

/// Stand-in fallback target bound to the service endpoint.
/// Its reply is driven by the method-scoped `mock` parameter.
#[derive(Debug, Clone)]
pub struct MockTarget {
    endpoint: ServiceEndpoint,
}

impl MockTarget {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl CallTarget for MockTarget {
    fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    async fn invoke(&self, call: &CallDescriptor) -> CallResult {
        let raw = self.endpoint.method_parameter(call.method(), MOCK_KEY, "");
        let behavior = MockBehavior::parse(&raw);
        debug!(method = call.method(), behavior = ?behavior, "Mock target invoked");

        match behavior {
            MockBehavior::Return(value) => Ok(Reply::value(value)),
            MockBehavior::Throw(message) => Err(Failure::Business(
                message.unwrap_or_else(|| format!("mocked failure for {}", call.method())),
            )),
            MockBehavior::Unsupported(value) => Err(Failure::System(format!(
                "no mock implementation for {}.{} (mock = {:?})",
                self.endpoint.service_interface(),
                call.method(),
                value
            ))),
        }
    }
}
