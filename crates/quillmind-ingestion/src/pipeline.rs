//! Ingestion pipeline orchestrator: structure parsing (B) followed by
//! chunking (A), producing the ordered [`Chunk`] list the dual index (C)
//! then takes as its `InsertChunks` input. Mirrors the progress-event /
//! result-summary shape of a broadcast-driven pipeline, trimmed down since
//! this system's input is caller-supplied text rather than fetched from
//! external literature sources.

use std::collections::HashMap;
use std::sync::Arc;

use quillmind_common::{Chunk, SectionNode};
use quillmind_llm::LlmRouter;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::chunker::{chunk_flat, chunk_structure, ChunkerConfig};
use crate::structure::parse_structure;

/// What to chunk: either raw text (runs the structure parser first) or an
/// already-structured tree supplied by the caller (§6 `structured_chunks`
/// request field), which skips (B) entirely.
#[derive(Debug, Clone)]
pub enum IngestSource {
    Content(String),
    StructuredChunks(Vec<SectionNode>),
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub paper_id: String,
    pub source: IngestSource,
    pub chunker_config: ChunkerConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestProgress {
    pub paper_id: String,
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub chunks_created: usize,
    pub section_types: HashMap<String, usize>,
    #[serde(skip)]
    pub chunks: Vec<Chunk>,
}

/// Runs structure parsing (when needed) then chunking for a single paper.
/// Parser failure never aborts the run (§4.2 failure model) — it silently
/// degrades to the rule-based fallback inside [`parse_structure`].
#[instrument(skip(router, req, progress_tx), fields(paper_id = %req.paper_id))]
pub async fn run_ingest(
    router: &LlmRouter,
    req: IngestRequest,
    progress_tx: Option<broadcast::Sender<IngestProgress>>,
) -> IngestOutcome {
    let emit = |stage: &str, message: String| {
        if let Some(tx) = &progress_tx {
            let _ = tx.send(IngestProgress { paper_id: req.paper_id.clone(), stage: stage.to_string(), message });
        }
    };

    let sections = match req.source {
        IngestSource::StructuredChunks(sections) => {
            emit("chunking", "using caller-supplied structure".to_string());
            sections
        }
        IngestSource::Content(text) => {
            emit("parsing", "running structure parser".to_string());
            let structure = parse_structure(router, &text).await;
            info!(sections = structure.sections.len(), "structure parsed");
            emit("chunking", format!("chunking {} top-level sections", structure.sections.len()));
            structure.sections
        }
    };

    let chunks = if sections.is_empty() {
        Vec::new()
    } else {
        chunk_structure(&req.paper_id, &sections, &req.chunker_config)
    };

    let mut section_types: HashMap<String, usize> = HashMap::new();
    for chunk in &chunks {
        *section_types.entry(chunk.section_type.as_str().to_string()).or_insert(0) += 1;
    }

    emit("done", format!("{} chunks created", chunks.len()));

    IngestOutcome { chunks_created: chunks.len(), section_types, chunks }
}

/// Convenience wrapper for flat (unstructured) text — used by the fallback
/// code path when the caller supplies neither `content` the parser can run
/// over nor `structured_chunks` (treated as a single `other` section).
pub async fn run_ingest_flat(paper_id: &str, text: &str, config: &ChunkerConfig) -> IngestOutcome {
    let chunks = chunk_flat(paper_id, text, config);
    let mut section_types: HashMap<String, usize> = HashMap::new();
    for chunk in &chunks {
        *section_types.entry(chunk.section_type.as_str().to_string()).or_insert(0) += 1;
    }
    IngestOutcome { chunks_created: chunks.len(), section_types, chunks }
}

pub type SharedRouter = Arc<LlmRouter>;

#[cfg(test)]
mod tests {
    use super::*;
    use quillmind_llm::RoutingPolicy;

    #[tokio::test]
    async fn structured_chunks_skip_the_parser() {
        let router = LlmRouter::new(RoutingPolicy::default());
        let req = IngestRequest {
            paper_id: "p1".to_string(),
            source: IngestSource::StructuredChunks(vec![SectionNode::leaf(
                quillmind_common::SectionType::Abstract,
                "Abstract",
                "A short abstract.",
            )]),
            chunker_config: ChunkerConfig::default(),
        };
        let outcome = run_ingest(&router, req, None).await;
        assert_eq!(outcome.chunks_created, 1);
        assert_eq!(outcome.section_types.get("abstract"), Some(&1));
    }

    #[tokio::test]
    async fn empty_content_yields_zero_chunks() {
        let outcome = run_ingest_flat("p1", "", &ChunkerConfig::default()).await;
        assert_eq!(outcome.chunks_created, 0);
    }
}
