//! `ask_paper` (§4.6.3): grounded question-answering over one paper's
//! retrieved chunks. Grounded in `AskPaperTool`.

use std::sync::Arc;

use async_trait::async_trait;
use quillmind_db::DualIndex;
use quillmind_llm::{LlmRequest, LlmRole, LlmRouter, Message as LlmMessage};
use quillmind_retrieval::{hybrid_search, Reranker, SearchRequest};
use serde_json::Value;

use super::AgentTool;

const GROUNDED_SYSTEM_PROMPT: &str =
    "Answer the user's question using only the excerpts provided below. If the excerpts do not contain \
     the answer, say so plainly rather than guessing.";

pub struct AskPaperTool {
    index: Arc<DualIndex>,
    router: Arc<LlmRouter>,
    reranker: Option<Arc<dyn Reranker>>,
    default_top_k: usize,
}

impl AskPaperTool {
    pub fn new(index: Arc<DualIndex>, router: Arc<LlmRouter>, reranker: Option<Arc<dyn Reranker>>, default_top_k: usize) -> Self {
        Self { index, router, reranker, default_top_k }
    }
}

#[async_trait]
impl AgentTool for AskPaperTool {
    fn name(&self) -> &str {
        "ask_paper"
    }

    fn description(&self) -> &str {
        "Answers a question about one specific paper, grounded strictly in that paper's retrieved excerpts."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "paper_id": {"type": "string"},
                "question": {"type": "string"},
                "chat_history": {"type": "array", "items": {"type": "object"}},
                "top_k": {"type": "integer"}
            },
            "required": ["paper_id", "question"]
        })
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let paper_id = params.get("paper_id").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing paper_id"))?;
        let question = params.get("question").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing question"))?;
        let top_k = params.get("top_k").and_then(Value::as_u64).map(|v| v as usize).unwrap_or(self.default_top_k);

        let mut req = SearchRequest::new(question, top_k).scoped_to(paper_id);
        req.use_reranker = true;
        let reranker = self.reranker.as_deref();
        let response = hybrid_search(&self.index, &self.router, reranker, req).await?;

        let excerpts = response
            .final_results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{i}] {}", r.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let history_tail: Vec<LlmMessage> = params
            .get("chat_history")
            .and_then(Value::as_array)
            .map(|history| {
                history
                    .iter()
                    .rev()
                    .take(5)
                    .rev()
                    .filter_map(|m| {
                        let role = m.get("role").and_then(Value::as_str)?;
                        let content = m.get("content").and_then(Value::as_str)?;
                        Some(match role {
                            "assistant" => LlmMessage::assistant(content),
                            _ => LlmMessage::user(content),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut messages = vec![LlmMessage::system(GROUNDED_SYSTEM_PROMPT)];
        messages.extend(history_tail);
        messages.push(LlmMessage::user(format!("Excerpts:\n{excerpts}\n\nQuestion: {question}")));

        let llm_response = self.router.complete(LlmRole::Main, LlmRequest::new(messages)).await?;

        Ok(serde_json::json!({
            "answer": llm_response.content,
            "references": response.final_results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_paper_id_and_question() {
        let schema = serde_json::json!({
            "required": ["paper_id", "question"]
        });
        assert_eq!(schema["required"].as_array().unwrap().len(), 2);
    }
}
