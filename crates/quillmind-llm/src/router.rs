//! Role-based LLM routing.
//!
//! `ferrumyx_llm::router` selects a backend by scanning prompt content for a
//! data-sensitivity classification. This system has no such concept;
//! instead it routes by the *functional role*
//! a call plays in the pipeline — the main conversational model, a cheap
//! "light" model for translation/summarization, a JSON-mode model for the
//! structure parser, and the embedding model. The selection mechanics
//! (register once at startup, route per call) are kept as-is.

use crate::backend::{LlmBackend, LlmRequest, LlmResponse, Result};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmRole {
    /// The agent loop's main reasoning/response model.
    Main,
    /// Cheap model used for query translation (§4.4) and rolling-summary /
    /// semantic-memory-extraction calls (§4.5).
    Light,
    /// JSON-mode completion for the structure parser (§4.2).
    Structured,
    /// Embedding calls (§4.4 step 3, §4.5.3).
    Embedding,
}

impl LlmRole {
    fn as_str(&self) -> &'static str {
        match self {
            LlmRole::Main => "main",
            LlmRole::Light => "light",
            LlmRole::Structured => "structured",
            LlmRole::Embedding => "embedding",
        }
    }
}

/// Maps each role to the name of a registered backend.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    pub main_backend: String,
    pub light_backend: String,
    pub structured_backend: String,
    pub embedding_backend: String,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            main_backend: "local".to_string(),
            light_backend: "local".to_string(),
            structured_backend: "local".to_string(),
            embedding_backend: "local".to_string(),
        }
    }
}

pub struct LlmRouter {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
    policy: RoutingPolicy,
}

impl LlmRouter {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self { backends: HashMap::new(), policy }
    }

    pub fn register_backend(&mut self, name: impl Into<String>, backend: Arc<dyn LlmBackend>) {
        self.backends.insert(name.into(), backend);
    }

    fn backend_for(&self, role: LlmRole) -> Result<&Arc<dyn LlmBackend>> {
        let name = match role {
            LlmRole::Main => &self.policy.main_backend,
            LlmRole::Light => &self.policy.light_backend,
            LlmRole::Structured => &self.policy.structured_backend,
            LlmRole::Embedding => &self.policy.embedding_backend,
        };
        self.backends
            .get(name)
            .ok_or_else(|| crate::backend::LlmError::NoBackendForRole(role.as_str().to_string()))
    }

    pub async fn complete(&self, role: LlmRole, req: LlmRequest) -> Result<LlmResponse> {
        self.backend_for(role)?.complete(req).await
    }

    pub async fn complete_stream(
        &self,
        role: LlmRole,
        req: LlmRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<crate::backend::LlmStreamDelta>> {
        self.backend_for(role)?.complete_stream(req).await
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.backend_for(LlmRole::Embedding)?.embed(texts).await
    }

    pub fn registered_backends(&self) -> Vec<&str> {
        self.backends.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LlmError, Message};
    use async_trait::async_trait;

    struct StubBackend {
        id: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl LlmBackend for StubBackend {
        async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse> {
            Ok(LlmResponse {
                content: self.reply.to_string(),
                model: self.id.to_string(),
                prompt_tokens: 1,
                completion_tokens: 1,
            })
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0_f32; 4]).collect())
        }

        fn model_id(&self) -> &str {
            self.id
        }
        fn is_local(&self) -> bool {
            true
        }
        fn max_context_tokens(&self) -> u32 {
            4096
        }
        fn max_output_tokens(&self) -> u32 {
            1024
        }
    }

    #[tokio::test]
    async fn routes_by_role() {
        let mut router = LlmRouter::new(RoutingPolicy {
            main_backend: "big".to_string(),
            light_backend: "small".to_string(),
            structured_backend: "small".to_string(),
            embedding_backend: "small".to_string(),
        });
        router.register_backend("big", Arc::new(StubBackend { id: "big", reply: "main-reply" }));
        router.register_backend("small", Arc::new(StubBackend { id: "small", reply: "light-reply" }));

        let main = router.complete(LlmRole::Main, LlmRequest::new(vec![Message::user("hi")])).await.unwrap();
        assert_eq!(main.content, "main-reply");

        let light = router.complete(LlmRole::Light, LlmRequest::new(vec![Message::user("hi")])).await.unwrap();
        assert_eq!(light.content, "light-reply");
    }

    #[tokio::test]
    async fn missing_backend_errors() {
        let router = LlmRouter::new(RoutingPolicy::default());
        let err = router.complete(LlmRole::Main, LlmRequest::new(vec![])).await.unwrap_err();
        assert!(matches!(err, LlmError::NoBackendForRole(_)));
    }
}
