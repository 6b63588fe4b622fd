//! Shared application state injected into every handler, grounded in
//! `ferrumyx_web::state::AppState`. Everything here is constructed once at
//! startup via [`AppState::new`] and handed to handlers behind an `Arc`
//! (§9 "replace global singletons with explicit dependency injection").

use std::sync::Arc;

use quillmind_agent::tools::analyze_paper::AnalyzePaperTool;
use quillmind_agent::tools::ask_paper::AskPaperTool;
use quillmind_agent::tools::generate_mindmap::GenerateMindmapTool;
use quillmind_agent::tools::search_literature::SearchLiteratureTool;
use quillmind_agent::tools::semantic_search::SemanticSearchTool;
use quillmind_agent::{CircuitBreakerManager, Config, ResearchAgent, ToolRegistry};
use quillmind_db::DualIndex;
use quillmind_llm::{LlmRouter, OllamaBackend, OpenAiBackend, RoutingPolicy};
use quillmind_memory::{Checkpointer, ConversationCache, InMemoryKvStore, KvStore, RedisKvStore, RollingSummaryManager, SlidingWindow};
use quillmind_retrieval::{LlmReranker, Reranker};

use crate::papers::PaperRegistry;
use crate::threads::ThreadRegistry;

/// Everything a handler needs, built once at startup and shared behind an
/// `Arc` (mirrors `ferrumyx_web::state::SharedState`).
#[derive(Clone)]
pub struct AppState {
    pub index: Arc<DualIndex>,
    pub router: Arc<LlmRouter>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub tools: Arc<ToolRegistry>,
    pub agent: Arc<ResearchAgent>,
    pub window: Arc<SlidingWindow>,
    pub summaries: Arc<RollingSummaryManager>,
    pub checkpointer: Arc<Checkpointer>,
    pub conversation_cache: Arc<ConversationCache>,
    pub threads: Arc<ThreadRegistry>,
    pub papers: Arc<PaperRegistry>,
    pub config: Arc<Config>,
}

pub type SharedState = Arc<AppState>;

fn build_router(config: &Config) -> LlmRouter {
    let policy = RoutingPolicy {
        main_backend: config.llm.routing.main.clone(),
        light_backend: config.llm.routing.light.clone(),
        structured_backend: config.llm.routing.structured.clone(),
        embedding_backend: config.llm.routing.embedding.clone(),
    };
    let mut router = LlmRouter::new(policy);

    router.register_backend(
        "local",
        Arc::new(OllamaBackend::new(&config.llm.local_base_url, &config.llm.local_model, &config.llm.local_embedding_model)),
    );

    if let Some(openai) = &config.llm.openai {
        match openai.resolve_api_key() {
            Ok(api_key) => {
                router.register_backend(
                    "openai",
                    Arc::new(OpenAiBackend::new(&openai.base_url, api_key, &openai.model, &openai.embedding_model)),
                );
            }
            Err(reason) => {
                tracing::warn!(%reason, "openai backend configured but its API key env var is unset, leaving it unregistered");
            }
        }
    }

    router
}

impl AppState {
    /// Builds every component from `config` and wires them into one
    /// `AppState`: the dual index, the LLM router (§6 "Consumed: LLM
    /// provider"), the reranker (if enabled), the five-tool catalog behind
    /// its breaker manager, the agent loop, and the four-tier memory stack.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let index = Arc::new(DualIndex::open(&config.database.dense_path, &config.database.sparse_path, config.database.embedding_dim).await?);
        index.create_collection(false).await?;

        let router = Arc::new(build_router(&config));

        let reranker: Option<Arc<dyn Reranker>> =
            if config.agent.use_reranker { Some(Arc::new(LlmReranker::new(router.clone()))) } else { None };

        let breakers = Arc::new(CircuitBreakerManager::new());
        let mut registry = ToolRegistry::new(breakers);
        registry.register(SearchLiteratureTool::new(config.agent.literature_api_base_url.clone()));
        registry.register(SemanticSearchTool::new(index.clone(), router.clone(), reranker.clone(), config.agent.default_top_k));
        registry.register(AskPaperTool::new(index.clone(), router.clone(), reranker.clone(), config.agent.default_top_k));
        registry.register(AnalyzePaperTool::new(index.clone(), router.clone()));
        registry.register(GenerateMindmapTool::new(index.clone(), router.clone()));
        let tools = Arc::new(registry);

        let agent = Arc::new(ResearchAgent::new(tools.clone(), router.clone(), config.agent.max_iterations));

        let kv = Self::kv_store(&config).await;
        let window = Arc::new(SlidingWindow::new(config.memory.window_size));
        let summaries = Arc::new(RollingSummaryManager::new(kv.clone(), config.memory.summary_threshold));
        let checkpointer = Arc::new(Checkpointer::new(kv.clone(), config.memory.checkpoint_ttl_secs));

        let threads = Arc::new(ThreadRegistry::new());
        let conversation_cache = Arc::new(ConversationCache::new(kv, threads.clone(), config.memory.conversation_cache_ttl_secs));

        Ok(Self {
            index,
            router,
            reranker,
            tools,
            agent,
            window,
            summaries,
            checkpointer,
            conversation_cache,
            threads,
            papers: Arc::new(PaperRegistry::new()),
            config: Arc::new(config),
        })
    }

    /// Builds the `KvStore` the memory stack runs on: `RedisKvStore` when
    /// `memory.kv_url` is reachable at startup, falling back to
    /// `InMemoryKvStore` for local/demo runs without a Redis instance.
    pub async fn kv_store(config: &Config) -> Arc<dyn KvStore> {
        match RedisKvStore::connect(&config.memory.kv_url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "could not connect to Redis, falling back to in-memory KV store");
                Arc::new(InMemoryKvStore::new())
            }
        }
    }
}
