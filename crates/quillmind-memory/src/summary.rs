//! Rolling summary (§4.5 tier 1), grounded in `ConversationSummaryManager`.

use std::sync::Arc;

use quillmind_common::{Message, Role};
use quillmind_llm::{LlmRequest, LlmRole, LlmRouter};

use crate::kv::KvStore;
use crate::MemoryError;

pub const DEFAULT_SUMMARY_THRESHOLD: usize = 20;
pub const DEFAULT_WINDOW_SIZE: usize = 10;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a conversation-summarization assistant, skilled at extracting key information.";

#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub summary: String,
    pub original_count: usize,
    pub summarized_count: usize,
    pub window_messages: Vec<Message>,
    pub from_cache: bool,
}

pub struct RollingSummaryManager {
    kv: Arc<dyn KvStore>,
    threshold: usize,
}

impl RollingSummaryManager {
    pub fn new(kv: Arc<dyn KvStore>, threshold: usize) -> Self {
        Self { kv, threshold }
    }

    fn summary_key(thread_id: &str) -> String {
        format!("summary:{thread_id}")
    }

    fn meta_key(thread_id: &str) -> String {
        format!("summary_meta:{thread_id}")
    }

    /// `ConversationSummaryManager.process`. If the thread's message count
    /// exceeds `threshold`, everything before the last `2 * window_size`
    /// messages is summarized. A cache hit whose cutoff has not advanced past
    /// the cached message count is served unchanged; otherwise only the
    /// incremental span since the last summary is merged with it.
    pub async fn process(
        &self,
        router: &LlmRouter,
        messages: &[Message],
        thread_id: &str,
        window_size: usize,
    ) -> Result<SummaryResult, MemoryError> {
        let original_count = messages.len();
        if original_count <= self.threshold {
            return Ok(SummaryResult {
                summary: String::new(),
                original_count,
                summarized_count: 0,
                window_messages: messages.to_vec(),
                from_cache: false,
            });
        }

        let cutoff = original_count.saturating_sub(window_size * 2);
        let to_summarize = &messages[..cutoff];
        let window_messages = messages[cutoff..].to_vec();

        let cached_summary = self.kv.get(&Self::summary_key(thread_id)).await?;
        let cached_count: Option<usize> =
            self.kv.get(&Self::meta_key(thread_id)).await?.and_then(|s| s.parse().ok());

        if let (Some(cached_summary), Some(cached_count)) = (cached_summary, cached_count) {
            if cutoff <= cached_count {
                return Ok(SummaryResult {
                    summary: cached_summary,
                    original_count,
                    summarized_count: cutoff,
                    window_messages,
                    from_cache: true,
                });
            }

            let new_messages = &messages[cached_count..cutoff];
            let mut augmented = vec![Message::new(
                Role::System,
                format!("Prior summary: {cached_summary}\n\nMerge the new conversation turns below into it."),
            )];
            augmented.extend_from_slice(new_messages);

            let summary = self.generate_summary(router, &augmented).await?;
            self.cache_summary(thread_id, &summary, cutoff).await?;

            return Ok(SummaryResult { summary, original_count, summarized_count: cutoff, window_messages, from_cache: false });
        }

        let summary = self.generate_summary(router, to_summarize).await?;
        self.cache_summary(thread_id, &summary, cutoff).await?;

        Ok(SummaryResult { summary, original_count, summarized_count: cutoff, window_messages, from_cache: false })
    }

    async fn cache_summary(&self, thread_id: &str, summary: &str, message_count: usize) -> Result<(), MemoryError> {
        // The summary cache carries no TTL of its own in the source; it is
        // invalidated only on thread delete (§4.5). A very long TTL stands in
        // for "no expiry" without introducing a second KvStore contract.
        const SUMMARY_CACHE_TTL_SECS: u64 = 30 * 24 * 3600;
        self.kv.set_ex(&Self::summary_key(thread_id), summary, SUMMARY_CACHE_TTL_SECS).await?;
        self.kv.set_ex(&Self::meta_key(thread_id), &message_count.to_string(), SUMMARY_CACHE_TTL_SECS).await?;
        Ok(())
    }

    /// Invalidates the cached summary for a deleted thread (§4.5 tier 1).
    pub async fn invalidate(&self, thread_id: &str) -> Result<(), MemoryError> {
        self.kv.del(&Self::summary_key(thread_id)).await?;
        self.kv.del(&Self::meta_key(thread_id)).await?;
        Ok(())
    }

    async fn generate_summary(&self, router: &LlmRouter, messages: &[Message]) -> Result<String, MemoryError> {
        let conversation = messages
            .iter()
            .map(|m| match m.role {
                Role::User => format!("User: {}", truncate(&m.content, 500)),
                Role::Assistant => format!("Assistant: {}", truncate(&m.content, 500)),
                Role::Tool => "[tool call result]".to_string(),
                Role::System => truncate(&m.content, 500),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Summarize the key information in the conversation below in at most 3 sentences, covering \
             (1) the user's main needs and questions, (2) the key information/advice the assistant gave, \
             (3) the main papers or research topics discussed, if any.\n\nConversation:\n{conversation}\n\nSummary:"
        );

        let req = LlmRequest::new(vec![
            quillmind_llm::Message::system(SUMMARY_SYSTEM_PROMPT),
            quillmind_llm::Message::user(prompt),
        ]);
        let resp = router.complete(LlmRole::Light, req).await?;
        Ok(resp.content.trim().to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;
    use async_trait::async_trait;
    use quillmind_llm::{LlmBackend, LlmResponse, RoutingPolicy};

    struct StubLlm;

    #[async_trait]
    impl LlmBackend for StubLlm {
        async fn complete(&self, _req: LlmRequest) -> quillmind_llm::Result<LlmResponse> {
            Ok(LlmResponse { content: "a short summary.".into(), model: "stub".into(), prompt_tokens: 1, completion_tokens: 1 })
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
    async fn under_threshold_skips_summarization() {
        let manager = RollingSummaryManager::new(Arc::new(InMemoryKvStore::new()), 20);
        let result = manager.process(&router(), &msgs(10), "t1", 10).await.unwrap();
        assert!(result.summary.is_empty());
        assert_eq!(result.window_messages.len(), 10);
    }

    #[tokio::test]
    async fn over_threshold_produces_summary_and_caches_it() {
        let manager = RollingSummaryManager::new(Arc::new(InMemoryKvStore::new()), 20);
        let result = manager.process(&router(), &msgs(25), "t1", 5).await.unwrap();
        assert!(!result.summary.is_empty());
        assert!(!result.from_cache);
        assert_eq!(result.window_messages.len(), 10);

        let second = manager.process(&router(), &msgs(25), "t1", 5).await.unwrap();
        assert!(second.from_cache);
    }

    #[tokio::test]
    async fn invalidate_clears_cache() {
        let manager = RollingSummaryManager::new(Arc::new(InMemoryKvStore::new()), 20);
        manager.process(&router(), &msgs(25), "t1", 5).await.unwrap();
        manager.invalidate("t1").await.unwrap();
        let result = manager.process(&router(), &msgs(25), "t1", 5).await.unwrap();
        assert!(!result.from_cache);
    }
}
