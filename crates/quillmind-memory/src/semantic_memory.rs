//! Semantic memory (§4.5 tier 3), grounded in `SemanticMemoryService`:
//! cross-session long-term memory stored in the dense index under the
//! reserved `memory:<user-id>` namespace.

use quillmind_common::{memory_namespace, Chunk, Message, Role, SectionType};
use quillmind_db::DualIndex;
use quillmind_llm::{LlmRequest, LlmRole, LlmRouter};
use quillmind_retrieval::{hybrid_search, Reranker, SearchRequest};
use serde::{Deserialize, Serialize};

use crate::MemoryError;

pub const DEFAULT_IMPORTANCE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_TOP_K: usize = 5;
/// Extraction only looks at the last 10 messages of the turn.
const EXTRACTION_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    UserPreference,
    ResearchInterest,
    KeyFinding,
    TaskContext,
    Feedback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedMemory {
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    pub importance: f32,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    memories: Vec<ExtractedMemory>,
}

const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are an information-extraction expert, skilled at identifying important information from \
     conversations. Only return valid JSON.";

/// Extracts zero or more memory candidates from the tail of a turn.
/// Best-effort: a parse failure or LLM error yields zero memories rather than
/// propagating as a turn failure (§4.5 tier 3).
pub async fn extract_memories(router: &LlmRouter, messages: &[Message]) -> Vec<ExtractedMemory> {
    let recent = if messages.len() > EXTRACTION_WINDOW { &messages[messages.len() - EXTRACTION_WINDOW..] } else { messages };

    let conversation: Vec<String> = recent
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .map(|m| {
            let role = if m.role == Role::User { "user" } else { "assistant" };
            format!("{role}: {}", truncate(&m.content, 300))
        })
        .collect();

    if conversation.is_empty() {
        return Vec::new();
    }

    let prompt = format!(
        "Analyze the conversation below and extract information worth remembering long-term about the user.\n\n\
         Conversation:\n{}\n\n\
         Return JSON of the form {{\"memories\": [{{\"type\": \"research_interest\", \"content\": \"...\", \"importance\": 0.8}}]}}. \
         Valid types: user_preference, research_interest, key_finding, task_context, feedback. \
         If nothing is worth remembering, return {{\"memories\": []}}. Return ONLY the JSON.",
        conversation.join("\n")
    );

    let mut req = LlmRequest::new(vec![
        quillmind_llm::Message::system(EXTRACTION_SYSTEM_PROMPT),
        quillmind_llm::Message::user(prompt),
    ]);
    req.json_mode = true;

    let resp = match router.complete(LlmRole::Light, req).await {
        Ok(resp) => resp,
        Err(reason) => {
            tracing::warn!(%reason, "semantic memory extraction call failed");
            return Vec::new();
        }
    };

    match serde_json::from_str::<ExtractionResponse>(&resp.content) {
        Ok(parsed) => parsed.memories.into_iter().filter(|m| m.importance >= DEFAULT_IMPORTANCE_THRESHOLD).collect(),
        Err(reason) => {
            tracing::warn!(%reason, "failed to parse semantic memory extraction result");
            Vec::new()
        }
    }
}

/// Embeds and writes extracted memories to the dense index under the
/// reserved `memory:<user-id>` namespace (§3, §4.5 tier 3).
pub async fn store_memories(
    index: &DualIndex,
    router: &LlmRouter,
    user_id: &str,
    memories: &[ExtractedMemory],
) -> Result<(), MemoryError> {
    if memories.is_empty() {
        return Ok(());
    }

    let namespace = memory_namespace(user_id);
    let contents: Vec<String> = memories.iter().map(|m| m.content.clone()).collect();
    let embeddings = router.embed(&contents).await?;

    let existing = index.chunks_for_paper(&namespace).await?;
    let next_ordinal = existing.len() as u32;

    let chunks: Vec<Chunk> = memories
        .iter()
        .enumerate()
        .map(|(i, m)| {
            Chunk::new(
                namespace.clone(),
                next_ordinal + i as u32,
                m.content.clone(),
                SectionType::Other,
                memory_type_label(m.memory_type),
                memory_type_label(m.memory_type),
                true,
            )
        })
        .collect();

    index.insert_chunks(&chunks, &embeddings).await?;
    Ok(())
}

fn memory_type_label(t: MemoryType) -> &'static str {
    match t {
        MemoryType::UserPreference => "user_preference",
        MemoryType::ResearchInterest => "research_interest",
        MemoryType::KeyFinding => "key_finding",
        MemoryType::TaskContext => "task_context",
        MemoryType::Feedback => "feedback",
    }
}

/// Recalls the top-5 memories relevant to `query`, formatted as a compact
/// user-context block. Recall always runs with `translate_query = false`
/// (memory content is assumed already in the query's working language) and
/// `use_reranker = true`, reusing (D) rather than a separate search path.
pub async fn recall_user_context(
    index: &DualIndex,
    router: &LlmRouter,
    reranker: Option<&(dyn Reranker)>,
    user_id: &str,
    query: &str,
) -> Result<String, MemoryError> {
    let namespace = memory_namespace(user_id);
    let req = SearchRequest {
        translate_query: false,
        use_reranker: true,
        ..SearchRequest::new(query, DEFAULT_TOP_K).scoped_to(namespace)
    };

    let response = hybrid_search(index, router, reranker, req).await?;
    if response.final_results.is_empty() {
        return Ok(String::new());
    }

    let lines: Vec<String> = response.final_results.iter().map(|r| format!("- {}", r.content)).collect();
    Ok(format!("Relevant things you know about this user:\n{}", lines.join("\n")))
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

    #[test]
    fn memory_type_labels_are_stable() {
        assert_eq!(memory_type_label(MemoryType::ResearchInterest), "research_interest");
        assert_eq!(memory_type_label(MemoryType::Feedback), "feedback");
    }

    #[tokio::test]
    async fn extract_memories_on_empty_conversation_returns_empty() {
        let mut router_stub = quillmind_llm::LlmRouter::new(quillmind_llm::RoutingPolicy::default());
        struct Noop;
        #[async_trait::async_trait]
        impl quillmind_llm::LlmBackend for Noop {
            async fn complete(&self, _req: LlmRequest) -> quillmind_llm::Result<quillmind_llm::LlmResponse> {
                unreachable!("should not be called for an empty conversation")
            }
            async fn embed(&self, _texts: &[String]) -> quillmind_llm::Result<Vec<Vec<f32>>> {
                unreachable!()
            }
            fn model_id(&self) -> &str { "noop" }
            fn is_local(&self) -> bool { true }
            fn max_context_tokens(&self) -> u32 { 0 }
            fn max_output_tokens(&self) -> u32 { 0 }
        }
        router_stub.register_backend("local", std::sync::Arc::new(Noop));

        let memories = extract_memories(&router_stub, &[]).await;
        assert!(memories.is_empty());
    }
}
