//! quillmind-llm — LLM backend abstraction and role-based routing.
//!
//! Covers §6 "Consumed: LLM provider": chat completion with JSON-mode
//! support and batch embeddings, behind a single [`LlmBackend`] trait so the
//! rest of the system never talks to a concrete provider directly.

pub mod backend;
pub mod router;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, LlmStreamDelta, Message, MessageRole, OllamaBackend, OpenAiBackend};
pub use router::{LlmRole, LlmRouter, RoutingPolicy};
