//! quillmind-common — shared data-model types and errors used across all
//! quillmind crates: §3 of the design (Paper, SectionNode, Chunk, Thread,
//! circuit-breaker state).

pub mod circuit;
pub mod conversation;
pub mod error;
pub mod paper;
pub mod section;

pub use circuit::{CircuitStats, CircuitState};
pub use conversation::{Message, Role, Thread};
pub use error::{CommonError, Result};
pub use paper::{is_memory_namespace, memory_namespace, parse_chunk_id, Chunk, Paper, MAX_HIERARCHY_PATH_CHARS};
pub use section::{PaperStructure, SectionNode, SectionType};
