//! Object cache and aggregate snapshot cache / 对象缓存与聚合快照缓存
//!
//! The object cache is a TTL'd key/value store picked once at startup:
//! - "memory": in-process map, per server / 进程内缓存
//! - "database": object_cache table, shared across processes / 数据库缓存
//!
//! The aggregate cache sits on top and holds the sitewide snapshot with
//! a fixed TTL. Simultaneous misses may each recompute; that stampede is
//! tolerated because recomputation is idempotent. / 允许缓存击穿并发重算

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::counter::error::{CounterError, Result};
use crate::models::AggregateSnapshot;

/// Cache key of the aggregate snapshot / 聚合快照缓存键
const KEY_TOTALS: &str = "aggregates:totals";

/// All aggregate keys this engine owns; invalidate_all touches only
/// these, never the throttle tickets. / 引擎持有的全部聚合键
const AGGREGATE_KEYS: &[&str] = &[KEY_TOTALS];

/// TTL'd object cache / 带过期时间的对象缓存
#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// Get a value, None when absent or expired / 获取值，不存在或过期返回None
    async fn get(&self, key: &str) -> Option<String>;

    /// Store a value with a TTL / 写入值并设置过期时间
    async fn set(&self, key: &str, value: String, ttl: Duration);

    /// Remove a value; removing a missing key is fine / 删除值
    async fn delete(&self, key: &str);
}

/// Closed set of cache backends, resolved once at startup / 缓存后端枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Database,
}

impl CacheBackend {
    /// Parse the configured backend name; an unknown name is a
    /// deployment mistake and fails fast. / 解析配置的后端名称
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "memory" => Ok(Self::Memory),
            "database" => Ok(Self::Database),
            other => Err(CounterError::Config(format!(
                "invalid cache backend <{}>, valid options are: <memory, database>",
                other
            ))),
        }
    }

    /// Build the cache instance for this backend / 构建缓存实例
    pub fn build(&self, db: &SqlitePool) -> Arc<dyn ObjectCache> {
        match self {
            Self::Memory => Arc::new(MemoryCache::new()),
            Self::Database => Arc::new(DbCache::new(db.clone())),
        }
    }
}

/// In-process cache / 进程内缓存
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        entries.get(key).and_then(|(value, expires_at)| {
            if Utc::now() < *expires_at {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let mut entries = self.entries.write();
        // Prune expired entries on write / 写入时清理过期条目
        let now = Utc::now();
        entries.retain(|_, (_, expires)| now < *expires);
        entries.insert(key.to_string(), (value, expires_at));
    }

    async fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

/// Database-backed cache, shared across processes / 数据库缓存
///
/// Failures degrade to cache misses; the cache must never take down
/// the request path.
pub struct DbCache {
    db: SqlitePool,
}

impl DbCache {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ObjectCache for DbCache {
    async fn get(&self, key: &str) -> Option<String> {
        let row: (String, String) = sqlx::query_as(
            "SELECT cache_value, expires_at FROM object_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Cache read failed for {}: {}", key, e);
            None
        })?;

        let (value, expires_at) = row;
        // RFC 3339 UTC timestamps compare lexically / RFC3339时间戳可按字典序比较
        if expires_at > Utc::now().to_rfc3339() {
            Some(value)
        } else {
            self.delete(key).await;
            None
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = (Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(3600)))
        .to_rfc3339();

        if let Err(e) = sqlx::query(
            "INSERT OR REPLACE INTO object_cache (cache_key, cache_value, expires_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(&value)
        .bind(&expires_at)
        .execute(&self.db)
        .await
        {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = sqlx::query("DELETE FROM object_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.db)
            .await
        {
            tracing::warn!("Cache delete failed for {}: {}", key, e);
        }
    }
}

/// Aggregate snapshot cache (cache-aside) / 聚合快照缓存
pub struct AggregateCache {
    cache: Arc<dyn ObjectCache>,
    ttl: Duration,
}

impl AggregateCache {
    pub fn new(cache: Arc<dyn ObjectCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Return the cached snapshot, or recompute and store it / 读取或重算快照
    pub async fn get_totals<F, Fut>(&self, recompute: F) -> Result<AggregateSnapshot>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AggregateSnapshot>>,
    {
        if let Some(raw) = self.cache.get(KEY_TOTALS).await {
            if let Ok(snapshot) = serde_json::from_str::<AggregateSnapshot>(&raw) {
                return Ok(snapshot);
            }
        }

        let snapshot = recompute().await?;

        if let Ok(raw) = serde_json::to_string(&snapshot) {
            self.cache.set(KEY_TOTALS, raw, self.ttl).await;
        }

        Ok(snapshot)
    }

    /// Drop one aggregate key immediately / 立即失效单个聚合键
    pub async fn invalidate(&self, key: &str) {
        self.cache.delete(key).await;
    }

    /// Drop every aggregate key this engine owns / 清空全部聚合键
    pub async fn invalidate_all(&self) {
        for key in AGGREGATE_KEYS {
            self.cache.delete(key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set("k", "v".to_string(), Duration::from_millis(30)).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_backend_name_parsing() {
        assert_eq!(CacheBackend::from_name("memory").unwrap(), CacheBackend::Memory);
        assert_eq!(CacheBackend::from_name("database").unwrap(), CacheBackend::Database);
        assert!(matches!(
            CacheBackend::from_name("redis"),
            Err(CounterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_aggregate_cache_aside() {
        let aggregates =
            AggregateCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));

        // 首次未命中，触发重算
        let first = aggregates
            .get_totals(|| async {
                Ok(AggregateSnapshot {
                    total_words: 60,
                    total_documents: 3,
                    pending_count: 0,
                    computed_at: Utc::now(),
                })
            })
            .await
            .unwrap();
        assert_eq!(first.total_words, 60);

        // Stale until invalidated: recompute must not run on a hit
        let second = aggregates
            .get_totals(|| async { panic!("recompute called on cache hit") })
            .await
            .unwrap();
        assert_eq!(second.total_words, 60);
        assert_eq!(second.average_words(), 20);

        aggregates.invalidate_all().await;
        let third = aggregates
            .get_totals(|| async {
                Ok(AggregateSnapshot {
                    total_words: 55,
                    total_documents: 3,
                    pending_count: 1,
                    computed_at: Utc::now(),
                })
            })
            .await
            .unwrap();
        assert_eq!(third.total_words, 55);
    }
}
