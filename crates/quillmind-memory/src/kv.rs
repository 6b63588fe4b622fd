//! `KvStore`: the injectable seam backing the checkpoint store (§4.5.4) and
//! conversation cache (§4.5.5). The distilled spec calls this "an external
//! key-value store" without naming a technology; the Python original is
//! Redis-specific (§9 "Additional open question"), so a real `redis`-backed
//! implementation ships as the default alongside an in-process implementation
//! for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, KvError>;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a key. Returns `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Writes a key, refreshing its TTL (§4.5.4: "every write refreshes the
    /// shared TTL on its keys").
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    /// Lists `(key, value)` pairs whose key starts with `prefix`, used by the
    /// checkpointer's `list(config, …)` contract.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// Redis-backed `KvStore` — the technology the Python original actually uses.
pub struct RedisKvStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn.keys(pattern).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = conn.get::<_, Option<String>>(&key).await? {
                out.push((key, value));
            }
        }
        Ok(out)
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process `HashMap`-backed `KvStore` for tests and for running without a
/// Redis instance. TTLs are honored on read (lazy expiry).
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().expect("kv store mutex poisoned");
        if let Some(entry) = entries.get(key) {
            if entry.expires_at.map(|at| Instant::now() >= at).unwrap_or(false) {
                entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut entries = self.entries.lock().expect("kv store mutex poisoned");
        entries.insert(
            key.to_string(),
            Entry { value: value.to_string(), expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)) },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("kv store mutex poisoned");
        entries.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let entries = self.entries.lock().expect("kv store mutex poisoned");
        let now = Instant::now();
        Ok(entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.expires_at.map(|at| now >= at).unwrap_or(false))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_value() {
        let kv = InMemoryKvStore::new();
        kv.set_ex("a:1", "hello", 60).await.unwrap();
        assert_eq!(kv.get("a:1").await.unwrap(), Some("hello".to_string()));
    }

    #[tokio::test]
    async fn del_removes_value() {
        let kv = InMemoryKvStore::new();
        kv.set_ex("a:1", "hello", 60).await.unwrap();
        kv.del("a:1").await.unwrap();
        assert_eq!(kv.get("a:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_prefix_filters_by_prefix() {
        let kv = InMemoryKvStore::new();
        kv.set_ex("checkpoint:t1:c1", "a", 60).await.unwrap();
        kv.set_ex("checkpoint:t1:c2", "b", 60).await.unwrap();
        kv.set_ex("other:t1", "c", 60).await.unwrap();
        let mut results = kv.scan_prefix("checkpoint:t1:").await.unwrap();
        results.sort();
        assert_eq!(results.len(), 2);
    }
}
