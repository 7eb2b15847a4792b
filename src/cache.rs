use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CacheError;

/// A distributed key/value cache holding serialized records.
///
/// Keys are record identifiers, values are opaque bytes.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Fetches every key present in the cache.
    ///
    /// The returned map is partial: keys that are absent were misses. An implementation may
    /// report "no key hit at all" as [`CacheError::Miss`], which callers must treat the same as
    /// an empty map. Any other error means the cache could not be consulted.
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, CacheError>;

    /// Stores a value. Best effort; callers are free to ignore the outcome.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;
}

/// An in-process [`CacheClient`] that behaves like memcached's multi-get.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    unreachable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`CacheError::Unreachable`] until turned back off.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_reachable(&self) -> Result<(), CacheError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CacheError::Unreachable("connection refused".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, CacheError> {
        self.check_reachable()?;
        let entries = self.entries.read().await;
        let hits = keys
            .iter()
            .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect::<HashMap<_, _>>();
        if hits.is_empty() {
            return Err(CacheError::Miss);
        }
        Ok(hits)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.check_reachable()?;
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }
}
