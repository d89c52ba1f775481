use crate::error::Failure;
use crate::target::{
    CallDescriptor, CallResult, CallTarget, MockTarget, Reply, TargetResolver,
    WANTS_FALLBACK_ATTACHMENT,
};
use std::sync::Arc;
use tracing::debug;

/// Runs a call against a substitute target instead of the real one
#[derive(Clone)]
pub struct FallbackExecutor {
    resolver: Arc<dyn TargetResolver>,
}

impl FallbackExecutor {
    pub fn new(resolver: Arc<dyn TargetResolver>) -> Self {
        Self { resolver }
    }

    /// Execute `call` on the first fallback target.
    ///
    /// The fallback target receives a copy of `call` carrying the
    /// [`WANTS_FALLBACK_ATTACHMENT`] marker; the caller's descriptor is left unchanged.
    /// A business failure from the fallback is returned as a reply carrying the cause.
    /// Any other failure becomes [`Failure::Fallback`], whose message also includes
    /// `original` when given.
    pub async fn execute(&self, call: &CallDescriptor, original: Option<&Failure>) -> CallResult {
        let mut call = call.clone();
        call.set_attachment(WANTS_FALLBACK_ATTACHMENT, "true");

        let target = self
            .select_target(&call)
            .await
            .map_err(|e| Failure::Fallback(compose_message(&e, original)))?;

        match target.invoke(&call).await {
            Ok(reply) => Ok(reply),
            Err(Failure::Business(cause)) => Ok(Reply::exception(cause)),
            Err(e) => Err(Failure::Fallback(compose_message(&e, original))),
        }
    }

    async fn select_target(&self, call: &CallDescriptor) -> Result<Arc<dyn CallTarget>, Failure> {
        let candidates = self.resolver.resolve(call).await?;

        if candidates.len() > 1 {
            // only the first candidate is ever used
            debug!(
                method = call.method(),
                candidates = candidates.len(),
                "Multiple fallback targets resolved"
            );
        }

        Ok(candidates.into_iter().next().unwrap_or_else(|| {
            Arc::new(MockTarget::new(self.resolver.endpoint().clone())) as Arc<dyn CallTarget>
        }))
    }
}

fn compose_message(fallback: &Failure, original: Option<&Failure>) -> String {
    match original {
        Some(original) => format!(
            "fallback failed: {}, original failure: {}",
            fallback.message(),
            original
        ),
        None => format!("fallback failed: {}", fallback.message()),
    }
}
