//! Primary/fallback provider pair.
//!
//! On a capacity-class error (rate limit, overload, quota) or a
//! model-not-found error from the primary, the request is retried exactly
//! once against the fallback provider. Auth and validation errors never
//! trigger fallback — they surface immediately.

use crate::error::LlmError;
use crate::providers::{Generation, GenerationRequest, GenerativeProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct FallbackProvider {
    primary: Arc<dyn GenerativeProvider>,
    fallback: Arc<dyn GenerativeProvider>,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn GenerativeProvider>, fallback: Arc<dyn GenerativeProvider>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl GenerativeProvider for FallbackProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        match self.primary.generate(request).await {
            Ok(generation) => Ok(generation),
            Err(e) if e.triggers_fallback() => {
                warn!(
                    primary = self.primary.model_name(),
                    fallback = self.fallback.model_name(),
                    error = %e,
                    "Primary provider failed, retrying against fallback"
                );
                self.fallback.generate(request).await
            }
            Err(e) => Err(e),
        }
    }

    fn model_name(&self) -> &str {
        self.primary.model_name()
    }

    fn supports_grounding(&self) -> bool {
        self.primary.supports_grounding()
    }
}
