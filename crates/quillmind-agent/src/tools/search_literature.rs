//! `search_literature` (§4.6.3 tool catalog): calls out to an external
//! OpenAlex-style literature-search collaborator. Grounded in
//! `SearchLiteratureTool`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::AgentTool;

#[derive(Debug, Deserialize)]
struct WorkSummary {
    id: String,
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    cited_by_count: u64,
    #[serde(default)]
    abstract_text: Option<String>,
}

pub struct SearchLiteratureTool {
    client: reqwest::Client,
    base_url: String,
}

impl SearchLiteratureTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl AgentTool for SearchLiteratureTool {
    fn name(&self) -> &str {
        "search_literature"
    }

    fn description(&self) -> &str {
        "Searches the academic literature database (OpenAlex-style) for papers matching a query. \
         Use this to discover new papers or survey a research area."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "search keywords or phrase"},
                "limit": {"type": "integer", "description": "number of results, default 10"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let query = params.get("query").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing query"))?;
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(10);

        let response = self
            .client
            .post(format!("{}/api/literature/search", self.base_url))
            .json(&serde_json::json!({"query": query, "per_page": limit}))
            .send()
            .await?
            .error_for_status()?;

        #[derive(Deserialize)]
        struct SearchResponse {
            #[serde(default)]
            results: Vec<WorkSummary>,
            #[serde(default)]
            total_count: Option<u64>,
        }

        let body: SearchResponse = response.json().await?;
        let results: Vec<Value> = body
            .results
            .into_iter()
            .take(limit as usize)
            .map(|w| {
                serde_json::json!({
                    "id": w.id,
                    "title": w.title,
                    "authors": w.authors,
                    "year": w.year,
                    "cited_by_count": w.cited_by_count,
                    "abstract": w.abstract_text,
                })
            })
            .collect();

        Ok(serde_json::json!({
            "query": query,
            "total_count": body.total_count.unwrap_or(results.len() as u64),
            "results": results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_query() {
        let tool = SearchLiteratureTool::new("http://localhost:9000");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"][0], "query");
    }
}
