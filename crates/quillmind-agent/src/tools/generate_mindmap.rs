//! `generate_mindmap` (§4.6.3): builds a hierarchy tree from a paper's
//! chunks' `hierarchy_path` breadcrumbs (e.g. "Methods > Data Collection"),
//! then an LLM pass titles/summarizes each node.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use quillmind_common::Chunk;
use quillmind_db::DualIndex;
use quillmind_llm::{LlmRequest, LlmRole, LlmRouter, Message as LlmMessage};
use serde::Serialize;
use serde_json::Value;

use super::AgentTool;

const DEFAULT_MAX_DEPTH: usize = 3;

#[derive(Debug, Default, Serialize)]
struct MindmapNode {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    children: Vec<MindmapNode>,
}

fn breadcrumb_parts(hierarchy_path: &str, max_depth: usize) -> Vec<String> {
    hierarchy_path
        .split('>')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .take(max_depth)
        .collect()
}

/// Groups chunk content under its breadcrumb path, one bucket per leaf node.
fn build_tree(chunks: &[Chunk], max_depth: usize) -> BTreeMap<Vec<String>, String> {
    let mut buckets: BTreeMap<Vec<String>, Vec<&str>> = BTreeMap::new();
    for chunk in chunks {
        let path = breadcrumb_parts(&chunk.hierarchy_path, max_depth);
        if path.is_empty() {
            continue;
        }
        buckets.entry(path).or_default().push(&chunk.content);
    }
    buckets.into_iter().map(|(path, contents)| (path, contents.join(" "))).collect()
}

fn insert_into_tree(root: &mut MindmapNode, path: &[String], body: &str) {
    if path.is_empty() {
        return;
    }
    let (head, rest) = path.split_first().unwrap();
    let child = match root.children.iter_mut().find(|c| &c.title == head) {
        Some(existing) => existing,
        None => {
            root.children.push(MindmapNode { title: head.clone(), ..Default::default() });
            root.children.last_mut().unwrap()
        }
    };
    if rest.is_empty() {
        let truncated: String = body.chars().take(600).collect();
        child.summary = Some(truncated);
    } else {
        insert_into_tree(child, rest, body);
    }
}

async fn summarize_node(router: &LlmRouter, node: &mut MindmapNode) -> anyhow::Result<()> {
    if let Some(body) = &node.summary {
        let messages = vec![
            LlmMessage::system("Summarize this section of a paper in one or two sentences for a mindmap node."),
            LlmMessage::user(format!("Section \"{}\":\n{}", node.title, body)),
        ];
        let response = router.complete(LlmRole::Light, LlmRequest::new(messages)).await?;
        node.summary = Some(response.content.trim().to_string());
    }
    for child in node.children.iter_mut() {
        Box::pin(summarize_node(router, child)).await?;
    }
    Ok(())
}

pub struct GenerateMindmapTool {
    index: Arc<DualIndex>,
    router: Arc<LlmRouter>,
}

impl GenerateMindmapTool {
    pub fn new(index: Arc<DualIndex>, router: Arc<LlmRouter>) -> Self {
        Self { index, router }
    }
}

#[async_trait]
impl AgentTool for GenerateMindmapTool {
    fn name(&self) -> &str {
        "generate_mindmap"
    }

    fn description(&self) -> &str {
        "Generates a hierarchical mindmap of a paper's structure, with an LLM-written summary per section."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "paper_id": {"type": "string"},
                "max_depth": {"type": "integer"}
            },
            "required": ["paper_id"]
        })
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let paper_id = params.get("paper_id").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing paper_id"))?;
        let max_depth = params.get("max_depth").and_then(Value::as_u64).map(|v| v as usize).unwrap_or(DEFAULT_MAX_DEPTH);

        let chunks = self.index.chunks_for_paper(paper_id).await?;
        if chunks.is_empty() {
            anyhow::bail!("no chunks found for paper_id {paper_id}");
        }

        let buckets = build_tree(&chunks, max_depth);
        let mut root = MindmapNode { title: paper_id.to_string(), ..Default::default() };
        for (path, body) in buckets {
            insert_into_tree(&mut root, &path, &body);
        }

        summarize_node(&self.router, &mut root).await?;

        Ok(serde_json::to_value(&root)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillmind_common::SectionType;

    fn chunk(path: &str, content: &str) -> Chunk {
        Chunk::new("p1", 0, content, SectionType::Methods, "t", path, true)
    }

    #[test]
    fn groups_chunks_by_breadcrumb_path() {
        let chunks = vec![
            chunk("Methods > Data Collection", "collected from public sources"),
            chunk("Methods > Data Collection", "and cleaned"),
            chunk("Results", "the model achieved 92% accuracy"),
        ];
        let tree = build_tree(&chunks, 3);
        assert_eq!(tree.len(), 2);
        assert!(tree.contains_key(&vec!["Methods".to_string(), "Data Collection".to_string()]));
        assert!(tree.contains_key(&vec!["Results".to_string()]));
    }

    #[test]
    fn insert_into_tree_nests_by_depth() {
        let mut root = MindmapNode { title: "p1".to_string(), ..Default::default() };
        insert_into_tree(&mut root, &["Methods".to_string(), "Data Collection".to_string()], "body text");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].title, "Methods");
        assert_eq!(root.children[0].children[0].title, "Data Collection");
        assert_eq!(root.children[0].children[0].summary.as_deref(), Some("body text"));
    }

    #[test]
    fn breadcrumb_parts_respects_max_depth() {
        let parts = breadcrumb_parts("A > B > C > D", 2);
        assert_eq!(parts, vec!["A".to_string(), "B".to_string()]);
    }
}
