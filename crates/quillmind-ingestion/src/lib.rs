//! quillmind-ingestion — the chunking engine (A), structure parser (B), and
//! the pipeline that orchestrates them ahead of dual-index insertion (C).

pub mod chunker;
pub mod pipeline;
pub mod structure;

pub use chunker::{chunk_flat, chunk_structure, ChunkerConfig};
pub use pipeline::{run_ingest, run_ingest_flat, IngestOutcome, IngestProgress, IngestRequest, IngestSource};
pub use structure::parse_structure;
