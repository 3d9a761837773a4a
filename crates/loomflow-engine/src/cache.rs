use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use loomflow_core::traits::{CacheRecord, CacheStore};

/// Wall-clock source, injectable so TTL behavior is testable.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

/// The default clock.
pub struct WallClock;

impl Clock for WallClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Per-node memoization store, keyed by node id so two cache nodes in the
/// same flow never collide. `Value::Null` is a valid cached value distinct
/// from "no entry."
///
/// An optional durable store mirrors the same hit/miss contract across
/// process restarts: reads fall back to it on memory miss, writes go
/// through. Store failures are logged, never fatal.
pub struct NodeCache {
    entries: Mutex<HashMap<String, CacheRecord>>,
    store: Option<Arc<dyn CacheStore>>,
}

impl NodeCache {
    pub fn new(store: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Fetch the stored value for `node_id` if it is a hit under the given
    /// TTL and invalidation watermark.
    ///
    /// `ttl_ms <= 0` disables caching unconditionally. An entry is a hit iff
    /// it exists, `now - timestamp < ttl_ms`, and (when a watermark is
    /// configured) `timestamp >= invalidate_ms`.
    pub async fn lookup(
        &self,
        node_id: &str,
        ttl_ms: i64,
        invalidate_ms: Option<i64>,
        now_ms: i64,
    ) -> Option<serde_json::Value> {
        if ttl_ms <= 0 {
            return None;
        }

        let mut entries = self.entries.lock().await;
        let record = match entries.get(node_id) {
            Some(record) => record.clone(),
            None => {
                let record = self.fetch_durable(node_id).await?;
                entries.insert(node_id.to_string(), record.clone());
                record
            }
        };

        if is_hit(&record, ttl_ms, invalidate_ms, now_ms) {
            Some(record.data)
        } else {
            None
        }
    }

    /// Store a value for `node_id`, stamped at `now_ms`.
    pub async fn store(&self, node_id: &str, data: serde_json::Value, now_ms: i64) {
        let record = CacheRecord {
            data,
            timestamp_ms: now_ms,
        };
        self.entries
            .lock()
            .await
            .insert(node_id.to_string(), record.clone());

        if let Some(store) = &self.store {
            if let Err(e) = store.set(node_id, record).await {
                warn!(node_id, error = %e, "Durable cache write failed");
            }
        }
    }

    async fn fetch_durable(&self, node_id: &str) -> Option<CacheRecord> {
        let store = self.store.as_ref()?;
        match store.get(node_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(node_id, error = %e, "Durable cache read failed");
                None
            }
        }
    }
}

fn is_hit(record: &CacheRecord, ttl_ms: i64, invalidate_ms: Option<i64>, now_ms: i64) -> bool {
    if now_ms - record.timestamp_ms >= ttl_ms {
        return false;
    }
    if let Some(watermark) = invalidate_ms {
        if record.timestamp_ms < watermark {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: i64 = 300_000;

    #[tokio::test]
    async fn miss_without_entry() {
        let cache = NodeCache::new(None);
        assert!(cache.lookup("n1", TTL, None, 1_000).await.is_none());
    }

    #[tokio::test]
    async fn hit_within_ttl() {
        let cache = NodeCache::new(None);
        cache.store("n1", serde_json::json!({"x": 1}), 1_000).await;
        assert_eq!(
            cache.lookup("n1", TTL, None, 2_000).await,
            Some(serde_json::json!({"x": 1}))
        );
    }

    #[tokio::test]
    async fn ttl_boundary_is_strict() {
        let cache = NodeCache::new(None);
        let now = 1_000_000;
        cache.store("n1", serde_json::json!("v"), now - (TTL + 1)).await;
        assert!(cache.lookup("n1", TTL, None, now).await.is_none());

        cache.store("n1", serde_json::json!("v"), now - (TTL - 1)).await;
        assert!(cache.lookup("n1", TTL, None, now).await.is_some());
    }

    #[tokio::test]
    async fn invalidate_watermark_turns_hit_into_miss() {
        let cache = NodeCache::new(None);
        cache.store("n1", serde_json::json!("v"), 5_000).await;

        // Entry written at 5000 is live at 6000...
        assert!(cache.lookup("n1", TTL, Some(4_000), 6_000).await.is_some());
        // ...but a newer watermark invalidates it.
        assert!(cache.lookup("n1", TTL, Some(5_001), 6_000).await.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_disables_lookup() {
        let cache = NodeCache::new(None);
        cache.store("n1", serde_json::json!("v"), 1_000).await;
        assert!(cache.lookup("n1", 0, None, 1_001).await.is_none());
        assert!(cache.lookup("n1", -5, None, 1_001).await.is_none());
    }

    #[tokio::test]
    async fn null_is_a_cacheable_value() {
        let cache = NodeCache::new(None);
        cache.store("n1", serde_json::Value::Null, 1_000).await;
        assert_eq!(
            cache.lookup("n1", TTL, None, 2_000).await,
            Some(serde_json::Value::Null)
        );
    }

    #[tokio::test]
    async fn keys_do_not_collide_across_nodes() {
        let cache = NodeCache::new(None);
        cache.store("a", serde_json::json!(1), 1_000).await;
        cache.store("b", serde_json::json!(2), 1_000).await;
        assert_eq!(
            cache.lookup("a", TTL, None, 2_000).await,
            Some(serde_json::json!(1))
        );
        assert_eq!(
            cache.lookup("b", TTL, None, 2_000).await,
            Some(serde_json::json!(2))
        );
    }
}
