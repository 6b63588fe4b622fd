//! `analyze_paper` (§4.6.3): an LLM synthesis pass over a paper's chunks,
//! taken directly from the dual index by ordinal rather than through
//! retrieval (no query string to rank against). Grounded in
//! `AnalyzePaperTool`.

use std::sync::Arc;

use async_trait::async_trait;
use quillmind_db::DualIndex;
use quillmind_llm::{LlmRequest, LlmRole, LlmRouter, Message as LlmMessage};
use serde_json::Value;

use super::AgentTool;

/// Caps how many of a paper's chunks are fed to one synthesis call.
const MAX_CHUNKS_FOR_ANALYSIS: usize = 40;

pub struct AnalyzePaperTool {
    index: Arc<DualIndex>,
    router: Arc<LlmRouter>,
}

impl AnalyzePaperTool {
    pub fn new(index: Arc<DualIndex>, router: Arc<LlmRouter>) -> Self {
        Self { index, router }
    }
}

#[async_trait]
impl AgentTool for AnalyzePaperTool {
    fn name(&self) -> &str {
        "analyze_paper"
    }

    fn description(&self) -> &str {
        "Produces an analysis report of one paper, optionally focused on a particular aspect \
         (e.g. methodology, results, limitations)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "paper_id": {"type": "string"},
                "aspect": {"type": "string", "description": "optional focus area"}
            },
            "required": ["paper_id"]
        })
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let paper_id = params.get("paper_id").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing paper_id"))?;
        let aspect = params.get("aspect").and_then(Value::as_str);

        let mut chunks = self.index.chunks_for_paper(paper_id).await?;
        chunks.sort_by_key(|c| c.ordinal);
        chunks.truncate(MAX_CHUNKS_FOR_ANALYSIS);

        if chunks.is_empty() {
            anyhow::bail!("no chunks found for paper_id {paper_id}");
        }

        let body = chunks
            .iter()
            .map(|c| format!("[{}] {}\n{}", c.ordinal, c.hierarchy_path, c.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let instruction = match aspect {
            Some(aspect) => format!("Write an analysis of this paper focused specifically on: {aspect}."),
            None => "Write a structured analysis of this paper covering its contributions, methodology, \
                     results, and limitations."
                .to_string(),
        };

        let messages = vec![
            LlmMessage::system("You are a research assistant producing a careful, structured paper analysis."),
            LlmMessage::user(format!("Paper content:\n{body}\n\n{instruction}")),
        ];

        let response = self.router.complete(LlmRole::Main, LlmRequest::new(messages)).await?;

        Ok(serde_json::json!({
            "paper_id": paper_id,
            "aspect": aspect,
            "analysis": response.content,
            "chunks_analyzed": chunks.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_paper_id_only() {
        let schema = serde_json::json!({"required": ["paper_id"]});
        assert_eq!(schema["required"].as_array().unwrap().len(), 1);
    }
}
