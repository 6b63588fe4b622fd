//! Configuration loading (§1 FULL), grounded in
//! `ferrumyx_agent::config::Config::load`.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dense_path: String,
    pub sparse_path: String,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

fn default_embedding_dim() -> usize {
    768
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_local_backend")]
    pub local_backend: String,
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,
    #[serde(default = "default_local_model")]
    pub local_model: String,
    #[serde(default = "default_local_embedding_model")]
    pub local_embedding_model: String,
    pub openai: Option<LlmBackendConfig>,
    /// Which role each registered backend serves (§4.2/§4.6): "local" or
    /// "openai" covers all four roles unless overridden here.
    #[serde(default)]
    pub routing: RoutingConfig,
}

fn default_local_backend() -> String {
    "ollama".to_string()
}
fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_local_model() -> String {
    "llama3:8b".to_string()
}
fn default_local_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    pub api_key_secret: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub base_url: String,
}

impl LlmBackendConfig {
    /// Reads the API key out of the environment variable named by
    /// `api_key_secret` — secrets never live in the toml file itself.
    pub fn resolve_api_key(&self) -> anyhow::Result<String> {
        let var = self.api_key_secret.as_deref().unwrap_or("OPENAI_API_KEY");
        std::env::var(var).map_err(|_| anyhow::anyhow!("environment variable {var} is not set"))
    }
}

/// Names the registered backend ("local" or "openai") each role routes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_backend")]
    pub main: String,
    #[serde(default = "default_routing_backend")]
    pub light: String,
    #[serde(default = "default_routing_backend")]
    pub structured: String,
    #[serde(default = "default_routing_backend")]
    pub embedding: String,
}

fn default_routing_backend() -> String {
    "local".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            main: default_routing_backend(),
            light: default_routing_backend(),
            structured: default_routing_backend(),
            embedding: default_routing_backend(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_initial_k")]
    pub initial_k: usize,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Base URL of the external literature-search collaborator the
    /// `search_literature` tool calls out to (§4.6.3).
    #[serde(default = "default_literature_api_base_url")]
    pub literature_api_base_url: String,
    #[serde(default)]
    pub use_reranker: bool,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_initial_k() -> usize {
    20
}
fn default_top_k() -> usize {
    5
}
fn default_literature_api_base_url() -> String {
    "http://localhost:9000".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            initial_k: default_initial_k(),
            default_top_k: default_top_k(),
            literature_api_base_url: default_literature_api_base_url(),
            use_reranker: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_kv_url")]
    pub kv_url: String,
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_checkpoint_ttl")]
    pub checkpoint_ttl_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub conversation_cache_ttl_secs: u64,
}

fn default_kv_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_summary_threshold() -> usize {
    20
}
fn default_window_size() -> usize {
    10
}
fn default_checkpoint_ttl() -> u64 {
    24 * 3600
}
fn default_cache_ttl() -> u64 {
    6 * 3600
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            kv_url: default_kv_url(),
            summary_threshold: default_summary_threshold(),
            window_size: default_window_size(),
            checkpoint_ttl_secs: default_checkpoint_ttl(),
            conversation_cache_ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,
}

fn default_jwt_secret() -> String {
    "change-me-in-production".to_string()
}
fn default_jwt_issuer() -> String {
    "quillmind".to_string()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { jwt_secret: default_jwt_secret(), jwt_issuer: default_jwt_issuer() }
    }
}

impl Config {
    /// Reads `QUILLMIND_CONFIG` (falling back to `quillmind.toml`) from the
    /// current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("QUILLMIND_CONFIG").unwrap_or_else(|_| "quillmind.toml".to_string());

        if !Path::new(&path).exists() {
            anyhow::bail!("Config file not found: {}\nCopy quillmind.example.toml to quillmind.toml and edit it.", path);
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_in_defaults() {
        let toml_src = r#"
            [database]
            dense_path = "./data/dense"
            sparse_path = "./data/sparse"

            [llm]
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.database.embedding_dim, 768);
        assert_eq!(config.llm.local_backend, "ollama");
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.memory.summary_threshold, 20);
        assert_eq!(config.http.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.security.jwt_issuer, "quillmind");
    }

    #[test]
    fn missing_config_file_errors_with_guidance() {
        std::env::set_var("QUILLMIND_CONFIG", "/nonexistent/quillmind.toml");
        let result = Config::load();
        std::env::remove_var("QUILLMIND_CONFIG");
        assert!(result.is_err());
    }
}
