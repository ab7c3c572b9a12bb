//! Query embedding with a two-tier cache.
//!
//! Tier 1 is a bounded in-process LRU keyed by the normalized query; tier 2
//! is an optional durable sqlite store with a TTL. A tier-2 hit is promoted
//! into tier 1. On a full miss the embedder collaborator is invoked and the
//! result written to both tiers; the tier-2 write is fire-and-forget and its
//! failure never fails the request.

use crate::error::EmbedError;
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Local hashing embedder (always available, no external dependencies).
///
/// Hashes term frequencies into a fixed-width, L2-normalized vector.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            return Ok(vector);
        }

        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }
        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// Durable tier-2 store contract: plain get/set with TTL semantics.
pub trait EmbeddingStore: Send + Sync {
    /// Look up a fresh (non-expired) vector.
    fn get(&self, key: &str) -> Option<Vec<f32>>;

    /// Store a vector, stamping it with the current time.
    fn put(&self, key: &str, vector: &[f32]) -> Result<(), String>;
}

/// Sqlite-backed tier-2 store with a time-to-live per entry.
pub struct SqliteEmbeddingStore {
    conn: Mutex<rusqlite::Connection>,
    ttl_secs: u64,
}

impl SqliteEmbeddingStore {
    pub fn open(path: &Path, ttl_secs: u64) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS embeddings (
                key TEXT PRIMARY KEY,
                vector BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_secs,
        })
    }

    fn now_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn encode(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn decode(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

impl EmbeddingStore for SqliteEmbeddingStore {
    fn get(&self, key: &str) -> Option<Vec<f32>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT vector, created_at FROM embeddings WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let (bytes, created_at) = row?;
        if Self::now_secs().saturating_sub(created_at) > self.ttl_secs as i64 {
            let _ = conn.execute("DELETE FROM embeddings WHERE key = ?1", [key]);
            return None;
        }
        Some(Self::decode(&bytes))
    }

    fn put(&self, key: &str, vector: &[f32]) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO embeddings (key, vector, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, Self::encode(vector), Self::now_secs()],
        )
        .map(|_| ())
        .map_err(|e| e.to_string())
    }
}

/// Normalize a query into its cache key: lowercase, trim, collapse whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Two-tier query→vector cache in front of an embedder.
pub struct EmbeddingCache {
    tier1: Mutex<LruCache<String, Vec<f32>>>,
    store: Option<Arc<dyn EmbeddingStore>>,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingCache {
    pub fn new(
        capacity: usize,
        store: Option<Arc<dyn EmbeddingStore>>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            tier1: Mutex::new(LruCache::new(capacity)),
            store,
            embedder,
        }
    }

    /// Look up or compute the embedding for a query.
    ///
    /// Returns the vector and a was-cached flag used for logging only.
    pub async fn get(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<(Vec<f32>, bool), EmbedError> {
        if cancel.is_cancelled() {
            return Err(EmbedError::Cancelled);
        }
        let key = normalize_query(query);

        if let Some(vector) = self.tier1.lock().unwrap().get(&key).cloned() {
            debug!(key = key.as_str(), "Embedding cache hit (tier 1)");
            return Ok((vector, true));
        }

        if let Some(ref store) = self.store {
            if let Some(vector) = store.get(&key) {
                debug!(key = key.as_str(), "Embedding cache hit (tier 2), promoting");
                self.tier1.lock().unwrap().put(key, vector.clone());
                return Ok((vector, true));
            }
        }

        if cancel.is_cancelled() {
            return Err(EmbedError::Cancelled);
        }
        let vector = self.embedder.embed(query).await?;
        self.tier1.lock().unwrap().put(key.clone(), vector.clone());

        if let Some(store) = self.store.clone() {
            let write_vector = vector.clone();
            tokio::spawn(async move {
                if let Err(e) = store.put(&key, &write_vector) {
                    warn!(error = %e, "Durable embedding cache write failed");
                }
            });
        }

        Ok((vector, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;
    impl EmbeddingStore for FailingStore {
        fn get(&self, _key: &str) -> Option<Vec<f32>> {
            None
        }
        fn put(&self, _key: &str, _vector: &[f32]) -> Result<(), String> {
            Err("disk full".into())
        }
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(
            normalize_query("  What   IS Family\tCode 1615?  "),
            "what is family code 1615?"
        );
    }

    #[tokio::test]
    async fn test_local_embedder_deterministic_and_normalized() {
        let embedder = LocalEmbedder::new(128);
        let v1 = embedder.embed("premarital agreement").await.unwrap();
        let v2 = embedder.embed("premarital agreement").await.unwrap();
        assert_eq!(v1, v2);
        let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_local_embedder_empty_text() {
        let embedder = LocalEmbedder::new(64);
        let v = embedder.embed("").await.unwrap();
        assert_eq!(v.len(), 64);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_cache_miss_then_hit() {
        let cache = EmbeddingCache::new(10, None, Arc::new(LocalEmbedder::new(32)));
        let cancel = CancellationToken::new();

        let (v1, was_cached) = cache.get("spousal support", &cancel).await.unwrap();
        assert!(!was_cached);
        let (v2, was_cached) = cache.get("  Spousal   SUPPORT ", &cancel).await.unwrap();
        assert!(was_cached); // normalized key matches
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_cache_lru_eviction() {
        let cache = EmbeddingCache::new(2, None, Arc::new(LocalEmbedder::new(16)));
        let cancel = CancellationToken::new();

        cache.get("alpha", &cancel).await.unwrap();
        cache.get("beta", &cancel).await.unwrap();
        cache.get("gamma", &cancel).await.unwrap(); // evicts alpha

        let (_, was_cached) = cache.get("alpha", &cancel).await.unwrap();
        assert!(!was_cached);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let cache = EmbeddingCache::new(10, None, Arc::new(LocalEmbedder::new(16)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cache.get("anything", &cancel).await;
        assert!(matches!(result, Err(EmbedError::Cancelled)));
    }

    #[tokio::test]
    async fn test_store_write_failure_does_not_fail_request() {
        let cache = EmbeddingCache::new(
            10,
            Some(Arc::new(FailingStore)),
            Arc::new(LocalEmbedder::new(16)),
        );
        let cancel = CancellationToken::new();
        let result = cache.get("community property", &cancel).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_store_roundtrip_and_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn EmbeddingStore> = Arc::new(
            SqliteEmbeddingStore::open(&dir.path().join("cache.db"), 3_600).unwrap(),
        );
        store.put("key", &[1.0, 2.5, -0.5]).unwrap();
        assert_eq!(store.get("key"), Some(vec![1.0, 2.5, -0.5]));

        // A tier-2 hit should report was_cached even with a cold tier 1.
        let cache = EmbeddingCache::new(10, Some(store), Arc::new(LocalEmbedder::new(3)));
        let cancel = CancellationToken::new();
        let (vector, was_cached) = cache.get("key", &cancel).await.unwrap();
        assert!(was_cached);
        assert_eq!(vector, vec![1.0, 2.5, -0.5]);
    }

    #[tokio::test]
    async fn test_sqlite_store_ttl_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEmbeddingStore::open(&dir.path().join("cache.db"), 0).unwrap();
        store.put("stale", &[1.0]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1_100));
        assert_eq!(store.get("stale"), None);
    }
}
