//! quillmind-memory — the four-tier memory stack (§4.5): rolling summary,
//! sliding window, cross-session semantic memory, and the checkpoint store
//! and conversation cache it all runs behind.

pub mod checkpointer;
pub mod context;
pub mod conversation_cache;
mod error;
pub mod kv;
pub mod semantic_memory;
pub mod sliding_window;
pub mod summary;

pub use checkpointer::{Checkpoint, CheckpointConfig, CheckpointMetadata, Checkpointer, CheckpointTuple};
pub use context::{ContextBuilder, PreparedContext};
pub use conversation_cache::{CacheStats, CacheStatsSnapshot, ConversationCache, ConversationStore};
pub use error::{MemoryError, Result};
pub use kv::{InMemoryKvStore, KvStore, RedisKvStore};
pub use semantic_memory::{extract_memories, recall_user_context, store_memories, ExtractedMemory, MemoryType};
pub use sliding_window::{SlidingWindow, WindowStats, WindowStrategy};
pub use summary::{RollingSummaryManager, SummaryResult};
