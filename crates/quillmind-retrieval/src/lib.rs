//! quillmind-retrieval — the hybrid retriever (D): cross-lingual query
//! translation, concurrent dense+sparse search, reciprocal rank fusion, and
//! optional cross-encoder reranking (§4.4).

pub mod language;
pub mod reranker;
pub mod rrf;
pub mod search;

pub use language::{detect_language, translate_query, Language};
pub use reranker::{apply_rerank_scores, LlmReranker, Reranker};
pub use rrf::{reciprocal_rank_fusion, FusedResult, RRF_K};
pub use search::{hybrid_search, RetrievalError, Result, SearchRequest, SearchResponse, SearchResultItem, SearchStats, DEFAULT_INITIAL_K};
