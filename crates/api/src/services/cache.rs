//! Typed key/value cache for catalog reads.
//!
//! Values are stored as JSON so one cache can hold categories, product
//! details and search pages side by side. Keys are namespaced by prefix
//! (`category:`, `product:`, `search:`) so writes can drop a whole family.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Cache key prefixes.
pub mod keys {
    pub const CATEGORY_PREFIX: &str = "category:";
    pub const CATEGORY_LIST: &str = "category:list";
    pub const CATEGORY_TREE: &str = "category:tree";
    pub const PRODUCT_PREFIX: &str = "product:";
    pub const SEARCH_PREFIX: &str = "search:";

    #[must_use]
    pub fn product(id: impl std::fmt::Display) -> String {
        format!("{PRODUCT_PREFIX}id:{id}")
    }

    #[must_use]
    pub fn product_slug(slug: &str) -> String {
        format!("{PRODUCT_PREFIX}slug:{slug}")
    }
}

/// Shared JSON cache with a fixed TTL.
#[derive(Clone)]
pub struct CacheService {
    inner: Cache<String, Arc<serde_json::Value>>,
}

impl CacheService {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Read and deserialize a cached value.
    ///
    /// An entry that no longer deserializes as `T` is evicted and reported
    /// as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.inner.get(key).await?;
        match T::deserialize(value.as_ref()) {
            Ok(decoded) => {
                debug!(key, "Cache hit");
                Some(decoded)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Evicting undecodable cache entry");
                self.inner.invalidate(key).await;
                None
            }
        }
    }

    /// Serialize and store a value. Values that fail to serialize are skipped.
    pub async fn set<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(json) => self.inner.insert(key, Arc::new(json)).await,
            Err(e) => tracing::warn!(key, error = %e, "Skipping unserializable cache value"),
        }
    }

    pub async fn remove(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Drop every entry whose key starts with `prefix`.
    pub async fn remove_by_prefix(&self, prefix: &str) {
        let doomed: Vec<Arc<String>> = self
            .inner
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        let removed = doomed.len();
        for key in doomed {
            self.inner.invalidate(key.as_str()).await;
        }
        debug!(prefix, removed, "Cache prefix invalidated");
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
        count: u32,
    }

    fn cache() -> CacheService {
        CacheService::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache();
        let entry = Entry {
            name: "mugs".to_string(),
            count: 3,
        };
        cache.set("category:list", &entry).await;
        assert_eq!(cache.get::<Entry>("category:list").await, Some(entry));
        assert_eq!(cache.get::<Entry>("category:tree").await, None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_a_miss() {
        let cache = cache();
        cache.set("k", &"plain string").await;
        assert_eq!(cache.get::<Entry>("k").await, None);
        // The undecodable entry is gone.
        assert_eq!(cache.get::<String>("k").await, None);
    }

    #[tokio::test]
    async fn test_remove_by_prefix() {
        let cache = cache();
        cache.set(keys::product_slug("teapot"), &1_u32).await;
        cache.set(keys::product("42"), &2_u32).await;
        cache.set("search:q=tea", &3_u32).await;

        cache.remove_by_prefix(keys::PRODUCT_PREFIX).await;

        assert_eq!(cache.get::<u32>(&keys::product_slug("teapot")).await, None);
        assert_eq!(cache.get::<u32>(&keys::product("42")).await, None);
        assert_eq!(cache.get::<u32>("search:q=tea").await, Some(3));

        cache.remove("search:q=tea").await;
        assert_eq!(cache.get::<u32>("search:q=tea").await, None);
    }
}
