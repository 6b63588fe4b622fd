//! `semantic_search` (§4.6.3 tool catalog): runs the hybrid retriever (D)
//! directly with reranking enabled. Grounded in `SemanticSearchTool`.

use std::sync::Arc;

use async_trait::async_trait;
use quillmind_db::DualIndex;
use quillmind_llm::LlmRouter;
use quillmind_retrieval::{hybrid_search, Reranker, SearchRequest};
use serde_json::Value;

use super::AgentTool;

pub struct SemanticSearchTool {
    index: Arc<DualIndex>,
    router: Arc<LlmRouter>,
    reranker: Option<Arc<dyn Reranker>>,
    default_top_k: usize,
}

impl SemanticSearchTool {
    pub fn new(index: Arc<DualIndex>, router: Arc<LlmRouter>, reranker: Option<Arc<dyn Reranker>>, default_top_k: usize) -> Self {
        Self { index, router, reranker, default_top_k }
    }
}

#[async_trait]
impl AgentTool for SemanticSearchTool {
    fn name(&self) -> &str {
        "semantic_search"
    }

    fn description(&self) -> &str {
        "Searches the user's uploaded papers by meaning, not just keywords. \
         Optionally scoped to a single paper_id."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "paper_id": {"type": "string", "description": "optional, scopes the search to one paper"},
                "top_k": {"type": "integer"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let query = params.get("query").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing query"))?;
        let top_k = params.get("top_k").and_then(Value::as_u64).map(|v| v as usize).unwrap_or(self.default_top_k);

        let mut req = SearchRequest::new(query, top_k);
        req.use_reranker = true;
        if let Some(paper_id) = params.get("paper_id").and_then(Value::as_str) {
            req = req.scoped_to(paper_id);
        }

        let reranker = self.reranker.as_deref();
        let response = hybrid_search(&self.index, &self.router, reranker, req).await?;
        Ok(serde_json::to_value(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_query_parameter() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        });
        assert_eq!(schema["required"][0], "query");
    }
}
