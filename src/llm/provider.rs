use async_trait::async_trait;

use super::types::{CompletionRequest, ProviderModel};
use crate::errors::RagError;

/// Embedding and completion capability consumed by the pipelines.
///
/// Implementations carry their configured chat and embedding model
/// identifiers; callers never pass model ids per request. Every transport or
/// status failure maps to `RagError::Upstream`, a single retryable-by-caller
/// category with no retries inside the adapter.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g. "openai-compat").
    fn name(&self) -> &str;

    /// True only when the endpoint is reachable AND both configured model
    /// identifiers appear in the provider's model list.
    async fn health_check(&self) -> Result<bool, RagError>;

    async fn list_models(&self) -> Result<Vec<ProviderModel>, RagError>;

    /// Non-streaming chat completion against the configured chat model.
    async fn complete(&self, request: CompletionRequest) -> Result<String, RagError>;

    /// Embed a single text with the configured embedding model.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed a batch, order-preserving. The result has exactly one vector
    /// per input or the call fails.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}
