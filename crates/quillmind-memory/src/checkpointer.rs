//! Checkpoint store (§4.5 tier 4), grounded in `RedisCheckpointer`. Persists
//! agent state per `thread_id` with TTL behind the checkpointer contract:
//! `get_tuple`, `put`, `put_writes`, `list`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::kv::KvStore;
use crate::MemoryError;

/// Every write refreshes the shared TTL on its keys — no separate expiry
/// policy per key (§4.5 tier 4).
pub const DEFAULT_CHECKPOINT_TTL_SECS: u64 = 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub thread_id: String,
    #[serde(default)]
    pub checkpoint_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    /// Opaque serialized agent state — the caller owns the schema.
    pub state: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointMetadata {
    pub step: u32,
    #[serde(default)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    pub config: CheckpointConfig,
    pub checkpoint: Checkpoint,
    pub metadata: CheckpointMetadata,
    /// This store keeps only the latest checkpoint per thread, not a chained
    /// history — `parent_config` is always `None`.
    pub parent_config: Option<CheckpointConfig>,
}

pub struct Checkpointer {
    kv: Arc<dyn KvStore>,
    ttl_secs: u64,
}

impl Checkpointer {
    pub fn new(kv: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    fn checkpoint_key(thread_id: &str, checkpoint_id: &str) -> String {
        format!("checkpoint:{thread_id}:{checkpoint_id}")
    }

    fn meta_key(thread_id: &str, checkpoint_id: &str) -> String {
        format!("checkpoint_meta:{thread_id}:{checkpoint_id}")
    }

    fn latest_key(thread_id: &str) -> String {
        format!("checkpoint_latest:{thread_id}")
    }

    fn writes_key(thread_id: &str, checkpoint_id: &str, task_id: &str) -> String {
        format!("checkpoint_writes:{thread_id}:{checkpoint_id}:{task_id}")
    }

    /// `get_tuple(config)`. With no explicit `checkpoint_id`, resolves
    /// through `checkpoint_latest` first.
    pub async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>, MemoryError> {
        let checkpoint_id = match &config.checkpoint_id {
            Some(id) => id.clone(),
            None => match self.kv.get(&Self::latest_key(&config.thread_id)).await? {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        let Some(checkpoint_raw) = self.kv.get(&Self::checkpoint_key(&config.thread_id, &checkpoint_id)).await? else {
            return Ok(None);
        };
        let checkpoint: Checkpoint = serde_json::from_str(&checkpoint_raw)?;

        let metadata = match self.kv.get(&Self::meta_key(&config.thread_id, &checkpoint_id)).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => CheckpointMetadata::default(),
        };

        Ok(Some(CheckpointTuple {
            config: CheckpointConfig { thread_id: config.thread_id.clone(), checkpoint_id: Some(checkpoint_id) },
            checkpoint,
            metadata,
            parent_config: None,
        }))
    }

    /// `put(config, checkpoint, metadata, versions) -> new_config`.
    pub async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig, MemoryError> {
        let thread_id = &config.thread_id;
        let checkpoint_id = checkpoint.checkpoint_id.clone();

        let checkpoint_raw = serde_json::to_string(&checkpoint)?;
        let meta_raw = serde_json::to_string(&metadata)?;

        self.kv.set_ex(&Self::checkpoint_key(thread_id, &checkpoint_id), &checkpoint_raw, self.ttl_secs).await?;
        self.kv.set_ex(&Self::meta_key(thread_id, &checkpoint_id), &meta_raw, self.ttl_secs).await?;
        self.kv.set_ex(&Self::latest_key(thread_id), &checkpoint_id, self.ttl_secs).await?;

        Ok(CheckpointConfig { thread_id: thread_id.clone(), checkpoint_id: Some(checkpoint_id) })
    }

    /// `put_writes(config, writes[], task_id)`.
    pub async fn put_writes(&self, config: &CheckpointConfig, writes: &[serde_json::Value], task_id: &str) -> Result<(), MemoryError> {
        let checkpoint_id = config.checkpoint_id.clone().unwrap_or_default();
        let raw = serde_json::to_string(writes)?;
        self.kv.set_ex(&Self::writes_key(&config.thread_id, &checkpoint_id, task_id), &raw, self.ttl_secs).await?;
        Ok(())
    }

    /// `list(config, …)`: every checkpoint currently stored for a thread.
    pub async fn list(&self, thread_id: &str) -> Result<Vec<CheckpointTuple>, MemoryError> {
        let prefix = format!("checkpoint:{thread_id}:");
        let entries = self.kv.scan_prefix(&prefix).await?;
        let mut out = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            let checkpoint_id = key.rsplit(':').next().unwrap_or_default().to_string();
            let checkpoint: Checkpoint = serde_json::from_str(&raw)?;
            let metadata = match self.kv.get(&Self::meta_key(thread_id, &checkpoint_id)).await? {
                Some(raw) => serde_json::from_str(&raw)?,
                None => CheckpointMetadata::default(),
            };
            out.push(CheckpointTuple {
                config: CheckpointConfig { thread_id: thread_id.to_string(), checkpoint_id: Some(checkpoint_id) },
                checkpoint,
                metadata,
                parent_config: None,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    fn checkpoint(id: &str) -> Checkpoint {
        Checkpoint { checkpoint_id: id.to_string(), state: serde_json::json!({"iteration": 1}) }
    }

    #[tokio::test]
    async fn put_then_get_tuple_resolves_latest() {
        let store = Checkpointer::new(Arc::new(InMemoryKvStore::new()), 60);
        let config = CheckpointConfig { thread_id: "t1".into(), checkpoint_id: None };
        store.put(&config, checkpoint("c1"), CheckpointMetadata::default()).await.unwrap();

        let tuple = store.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.checkpoint_id, "c1");
        assert!(tuple.parent_config.is_none());
    }

    #[tokio::test]
    async fn get_tuple_missing_thread_returns_none() {
        let store = Checkpointer::new(Arc::new(InMemoryKvStore::new()), 60);
        let config = CheckpointConfig { thread_id: "missing".into(), checkpoint_id: None };
        assert!(store.get_tuple(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = Checkpointer::new(Arc::new(InMemoryKvStore::new()), 60);
        let config = CheckpointConfig { thread_id: "t1".into(), checkpoint_id: None };
        store.put(&config, checkpoint("c1"), CheckpointMetadata::default()).await.unwrap();
        store.put(&config, checkpoint("c1"), CheckpointMetadata::default()).await.unwrap();

        let list = store.list("t1").await.unwrap();
        assert_eq!(list.len(), 1);
    }
}
