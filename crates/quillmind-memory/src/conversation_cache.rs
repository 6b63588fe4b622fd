//! Write-behind conversation history cache (§4.5.5), grounded in
//! `ConversationCache`: reads prefer the cache, writes update the cache
//! synchronously and persist to the conversation store in the background.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use quillmind_common::Message;
use tokio::sync::mpsc;

use crate::kv::KvStore;
use crate::MemoryError;

/// 6-hour cache TTL, matching the source's `cache_ttl` default.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 6 * 3600;

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
    /// Depth of the write-behind queue (§4.5.5/§5 backpressure): incremented
    /// on enqueue, decremented once the background worker finishes a write.
    pub queue_depth: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsSnapshot {
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub queue_depth: u64,
    pub hit_rate: f64,
}

/// The external, durable collaborator the cache writes behind — stands in
/// for the conversation-service HTTP API the source persists to.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load_messages(&self, thread_id: &str) -> Result<Vec<Message>, MemoryError>;
    async fn save_message(&self, thread_id: &str, message: &Message) -> Result<(), MemoryError>;
}

enum WriteTask {
    SaveMessage { thread_id: String, message: Message },
    Shutdown,
}

pub struct ConversationCache {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn ConversationStore>,
    ttl_secs: u64,
    stats: Arc<CacheStats>,
    write_tx: mpsc::UnboundedSender<WriteTask>,
    writer: tokio::task::JoinHandle<()>,
}

impl ConversationCache {
    fn history_key(thread_id: &str) -> String {
        format!("conv_history:{thread_id}")
    }

    /// Spawns the background writer immediately — mirrors
    /// `init_conversation_cache`'s eager `start_background_writer` call.
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<dyn ConversationStore>, ttl_secs: u64) -> Self {
        let stats = Arc::new(CacheStats::default());
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteTask>();

        let worker_store = store.clone();
        let worker_stats = stats.clone();
        let writer = tokio::spawn(async move {
            while let Some(task) = write_rx.recv().await {
                match task {
                    WriteTask::Shutdown => break,
                    WriteTask::SaveMessage { thread_id, message } => {
                        match worker_store.save_message(&thread_id, &message).await {
                            Ok(()) => {
                                worker_stats.writes.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(reason) => {
                                tracing::warn!(%reason, thread_id, "failed to persist conversation message");
                            }
                        }
                        worker_stats.queue_depth.fetch_sub(1, Ordering::Relaxed);
                    }
                }
            }
        });

        Self { kv, store, ttl_secs, stats, write_tx, writer }
    }

    /// Cache-first read. A miss falls through to the conversation store and
    /// repopulates the cache.
    pub async fn load_history(&self, thread_id: &str) -> Result<Vec<Message>, MemoryError> {
        let key = Self::history_key(thread_id);
        if let Some(cached) = self.kv.get(&key).await? {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(serde_json::from_str(&cached)?);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let history = self.store.load_messages(thread_id).await?;
        let raw = serde_json::to_string(&history)?;
        self.kv.set_ex(&key, &raw, self.ttl_secs).await?;
        Ok(history)
    }

    /// Updates the cache synchronously, then enqueues the durable write —
    /// the write-behind ordering guarantee: the cache always reflects a
    /// message before its persistence is even attempted.
    pub async fn append_message(&self, thread_id: &str, message: Message) -> Result<(), MemoryError> {
        let key = Self::history_key(thread_id);
        let mut history = match self.kv.get(&key).await? {
            Some(cached) => serde_json::from_str(&cached)?,
            None => Vec::new(),
        };
        history.push(message.clone());
        let raw = serde_json::to_string(&history)?;
        self.kv.set_ex(&key, &raw, self.ttl_secs).await?;

        if self.write_tx.send(WriteTask::SaveMessage { thread_id: thread_id.to_string(), message }).is_ok() {
            self.stats.queue_depth.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub async fn invalidate(&self, thread_id: &str) -> Result<(), MemoryError> {
        self.kv.del(&Self::history_key(thread_id)).await?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drains the background writer's queue and stops it — `close()`.
    pub async fn shutdown(self) {
        let _ = self.write_tx.send(WriteTask::Shutdown);
        let _ = self.writer.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;
    use quillmind_common::Role;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        saved: StdMutex<Vec<(String, Message)>>,
    }

    #[async_trait]
    impl ConversationStore for FakeStore {
        async fn load_messages(&self, _thread_id: &str) -> Result<Vec<Message>, MemoryError> {
            Ok(Vec::new())
        }
        async fn save_message(&self, thread_id: &str, message: &Message) -> Result<(), MemoryError> {
            self.saved.lock().unwrap().push((thread_id.to_string(), message.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn miss_then_hit_updates_stats() {
        let cache = ConversationCache::new(Arc::new(InMemoryKvStore::new()), Arc::new(FakeStore::default()), 60);
        cache.load_history("t1").await.unwrap();
        cache.load_history("t1").await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn append_message_is_visible_before_persistence_completes() {
        let cache = ConversationCache::new(Arc::new(InMemoryKvStore::new()), Arc::new(FakeStore::default()), 60);
        cache.append_message("t1", Message::new(Role::User, "hello")).await.unwrap();
        let history = cache.load_history("t1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello");
    }

    #[tokio::test]
    async fn shutdown_drains_writer_without_panicking() {
        let cache = ConversationCache::new(Arc::new(InMemoryKvStore::new()), Arc::new(FakeStore::default()), 60);
        cache.append_message("t1", Message::new(Role::User, "hi")).await.unwrap();
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn queue_depth_drains_back_to_zero_after_shutdown() {
        let cache = ConversationCache::new(Arc::new(InMemoryKvStore::new()), Arc::new(FakeStore::default()), 60);
        cache.append_message("t1", Message::new(Role::User, "one")).await.unwrap();
        cache.append_message("t1", Message::new(Role::User, "two")).await.unwrap();
        cache.shutdown().await;
        // the worker drains every enqueued write before Shutdown breaks its loop.
        assert_eq!(cache.stats.queue_depth.load(Ordering::Relaxed), 0);
    }
}
