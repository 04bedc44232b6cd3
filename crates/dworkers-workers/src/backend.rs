use crate::stream::DeltaSink;
use async_trait::async_trait;
use dworkers_core::DworkersResult;
use serde::{Deserialize, Serialize};

/// One completion request sent to a model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// `provider:model` as resolved from the tenant.
    pub model: String,
    /// System instructions.
    pub system: String,
    /// User prompt.
    pub prompt: String,
}

/// Abstraction over the model provider.
///
/// Failures are returned as `Err`; [`crate::RoleWorker`] turns them into
/// failed [`crate::WorkerOutput`]s.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Generate a completion.
    async fn complete(&self, request: &CompletionRequest) -> DworkersResult<String>;

    /// Stream increments into `sink` and return the full text. The default
    /// sends the whole completion as a single increment.
    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        sink: &DeltaSink,
    ) -> DworkersResult<String> {
        let text = self.complete(request).await?;
        sink.send(text.clone()).await?;
        Ok(text)
    }
}

/// Deterministic backend that never touches the network.
///
/// It answers with a fixed-format echo of the request, which is enough to
/// drive plans end to end from the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct OfflineBackend;

impl OfflineBackend {
    /// The offline backend.
    pub fn new() -> Self {
        Self
    }

    fn render(request: &CompletionRequest) -> String {
        let role_line = request.system.lines().next().unwrap_or_default();
        format!(
            "[{}] {}\n\n{}",
            request.model,
            role_line,
            request.prompt.trim()
        )
    }
}

#[async_trait]
impl ModelBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, request: &CompletionRequest) -> DworkersResult<String> {
        Ok(Self::render(request))
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        sink: &DeltaSink,
    ) -> DworkersResult<String> {
        let text = Self::render(request);
        for chunk in text.split_inclusive(char::is_whitespace) {
            sink.send(chunk).await?;
        }
        Ok(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "openai:gpt-4o".into(),
            system: "You are an analyst.\n\nMore detail.".into(),
            prompt: "Assess the market".into(),
        }
    }

    #[tokio::test]
    async fn test_offline_is_deterministic() {
        let backend = OfflineBackend::new();
        let a = backend.complete(&request()).await.unwrap();
        let b = backend.complete(&request()).await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("[openai:gpt-4o] You are an analyst."));
        assert!(a.ends_with("Assess the market"));
    }

    #[tokio::test]
    async fn test_offline_stream_matches_complete() {
        let backend = OfflineBackend::new();
        let streamed = backend
            .complete_stream(&request(), &DeltaSink::discard())
            .await
            .unwrap();
        assert_eq!(streamed, backend.complete(&request()).await.unwrap());
    }
}
