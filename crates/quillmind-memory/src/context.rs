//! `PrepareContext` (§4.5): composes the sliding window, rolling summary,
//! and semantic-memory recall into the message list and extra context an
//! agent turn is built from.

use quillmind_common::{Message, Role};
use quillmind_db::DualIndex;
use quillmind_llm::LlmRouter;
use quillmind_retrieval::Reranker;

use crate::semantic_memory::recall_user_context;
use crate::sliding_window::{SlidingWindow, WindowStrategy};
use crate::summary::RollingSummaryManager;
use crate::MemoryError;

#[derive(Debug, Clone)]
pub struct PreparedContext {
    /// The bounded message list to hand to the LLM, with the rolling summary
    /// (if any) prepended as a synthetic system message.
    pub messages: Vec<Message>,
    pub conversation_summary: Option<String>,
    pub user_context: String,
}

pub struct ContextBuilder<'a> {
    pub window: &'a SlidingWindow,
    pub summaries: &'a RollingSummaryManager,
    pub index: &'a DualIndex,
    pub router: &'a LlmRouter,
    pub reranker: Option<&'a (dyn Reranker)>,
}

impl<'a> ContextBuilder<'a> {
    /// Runs the full tier-1/2/3 pipeline for one turn: summarize anything
    /// outside the window, recall relevant cross-session memories for
    /// `query`, and bound the result to the configured window strategy.
    pub async fn prepare(
        &self,
        messages: &[Message],
        thread_id: &str,
        user_id: &str,
        query: &str,
        strategy: WindowStrategy,
        max_tokens: usize,
        reserve_tokens: usize,
    ) -> Result<PreparedContext, MemoryError> {
        let summary_result = self.summaries.process(self.router, messages, thread_id, self.window.window_size).await?;

        let user_context = recall_user_context(self.index, self.router, self.reranker, user_id, query).await?;

        let (mut windowed, _stats) = self.window.apply(&summary_result.window_messages, strategy, max_tokens, reserve_tokens);

        let conversation_summary = if summary_result.summary.is_empty() { None } else { Some(summary_result.summary.clone()) };
        if let Some(summary) = &conversation_summary {
            windowed.insert(0, Message::new(Role::System, format!("Earlier conversation summary: {summary}")));
        }

        Ok(PreparedContext { messages: windowed, conversation_summary, user_context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;
    use async_trait::async_trait;
    use quillmind_db::DualIndex;
    use quillmind_llm::{LlmBackend, LlmRequest, LlmResponse, RoutingPolicy};
    use std::sync::Arc;

    struct StubLlm;

    #[async_trait]
    impl LlmBackend for StubLlm {
        async fn complete(&self, _req: LlmRequest) -> quillmind_llm::Result<LlmResponse> {
            Ok(LlmResponse { content: "summary text.".into(), model: "stub".into(), prompt_tokens: 1, completion_tokens: 1 })
        }
        async fn embed(&self, texts: &[String]) -> quillmind_llm::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
        fn model_id(&self) -> &str { "stub" }
        fn is_local(&self) -> bool { true }
        fn max_context_tokens(&self) -> u32 { 4096 }
        fn max_output_tokens(&self) -> u32 { 1024 }
    }

    fn router() -> LlmRouter {
        let mut r = LlmRouter::new(RoutingPolicy::default());
        r.register_backend("local", Arc::new(StubLlm));
        r
    }

    fn msgs(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::new(Role::User, format!("msg {i}"))).collect()
    }

    #[tokio::test]
    async fn short_conversation_skips_summary_and_returns_all_messages() {
        let dir = tempfile::tempdir().unwrap();
        let dense_path = dir.path().join("dense");
        let sparse_path = dir.path().join("sparse");
        let index = DualIndex::open(dense_path.to_str().unwrap(), sparse_path.to_str().unwrap(), 4).await.unwrap();
        index.create_collection(false).await.unwrap();

        let window = SlidingWindow::new(10);
        let summaries = RollingSummaryManager::new(Arc::new(InMemoryKvStore::new()), 20);
        let router = router();
        let builder = ContextBuilder { window: &window, summaries: &summaries, index: &index, router: &router, reranker: None };

        let ctx = builder
            .prepare(&msgs(4), "t1", "u1", "what is attention", WindowStrategy::Hybrid, 4000, 500)
            .await
            .unwrap();

        assert_eq!(ctx.messages.len(), 4);
        assert!(ctx.conversation_summary.is_none());
        assert!(ctx.user_context.is_empty());
    }
}
