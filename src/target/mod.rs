//! Call targets and their resolution.
//!
//! A [`CallTarget`] performs one call described by a [`CallDescriptor`]. Real targets
//! talk to the remote service; fallback targets produce a substitute reply. A
//! [`TargetResolver`] hands out targets for a call and switches to fallback targets when
//! the call carries the [`WANTS_FALLBACK_ATTACHMENT`] marker.

pub mod endpoint;
pub mod http;
pub mod mock;

pub use endpoint::ServiceEndpoint;
pub use self::http::HttpTarget;
pub use mock::{MockBehavior, MockTarget};

use crate::error::Failure;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Attachment set on a call when the resolver should return fallback targets
pub const WANTS_FALLBACK_ATTACHMENT: &str = "wants_fallback";

/// Result of a single call
pub type CallResult = std::result::Result<Reply, Failure>;

/// A call travelling through the invoker
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallDescriptor {
    method: String,
    arguments: Vec<Value>,
    attachments: HashMap<String, String>,
}

impl CallDescriptor {
    pub fn new(method: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            arguments,
            attachments: HashMap::new(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn attachments(&self) -> &HashMap<String, String> {
        &self.attachments
    }

    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.insert(key.into(), value.into());
    }

    /// Whether the resolver should hand out fallback targets for this call
    pub fn wants_fallback(&self) -> bool {
        self.attachment(WANTS_FALLBACK_ATTACHMENT)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// Successful reply. A fallback business failure is carried as `exception` instead of
/// being raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl Reply {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            exception: None,
        }
    }

    pub fn exception(cause: impl Into<String>) -> Self {
        Self {
            value: Value::Null,
            exception: Some(cause.into()),
        }
    }

    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }
}

/// Anything a call can be sent to
#[async_trait]
pub trait CallTarget: Send + Sync {
    /// Endpoint this target is bound to
    fn endpoint(&self) -> &ServiceEndpoint;

    fn is_available(&self) -> bool {
        true
    }

    async fn invoke(&self, call: &CallDescriptor) -> CallResult;

    /// Release any resources held by the target
    fn destroy(&self) {}
}

/// Resolves candidate targets for a call
#[async_trait]
pub trait TargetResolver: Send + Sync {
    fn endpoint(&self) -> &ServiceEndpoint;

    fn is_available(&self) -> bool;

    /// Ordered candidates; fallback targets when `call.wants_fallback()` is set
    async fn resolve(
        &self,
        call: &CallDescriptor,
    ) -> std::result::Result<Vec<Arc<dyn CallTarget>>, Failure>;
}

/// Resolver over fixed lists of real and fallback targets
pub struct StaticResolver {
    endpoint: ServiceEndpoint,
    targets: Vec<Arc<dyn CallTarget>>,
    fallbacks: Vec<Arc<dyn CallTarget>>,
}

impl StaticResolver {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        Self {
            endpoint,
            targets: Vec::new(),
            fallbacks: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: Arc<dyn CallTarget>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_fallback(mut self, target: Arc<dyn CallTarget>) -> Self {
        self.fallbacks.push(target);
        self
    }
}

#[async_trait]
impl TargetResolver for StaticResolver {
    fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    fn is_available(&self) -> bool {
        self.targets.iter().any(|t| t.is_available())
    }

    async fn resolve(
        &self,
        call: &CallDescriptor,
    ) -> std::result::Result<Vec<Arc<dyn CallTarget>>, Failure> {
        let pool = if call.wants_fallback() {
            &self.fallbacks
        } else {
            &self.targets
        };
        Ok(pool.iter().filter(|t| t.is_available()).cloned().collect())
    }
}
