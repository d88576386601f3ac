//! Cache store implementation
//!
//! In-memory TTL cache with ETag generation, keyed by [`DashboardKey`].

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{CacheConfig, DashboardKey};

/// A cached response body
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized JSON body
    pub data: Vec<u8>,
    /// Quoted SHA256 prefix of the body
    pub etag: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        let etag = Self::compute_etag(&data);
        let now = Instant::now();
        Self {
            data,
            etag,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn compute_etag(data: &[u8]) -> String {
        let hash = Sha256::digest(data);
        format!("\"{}\"", hex::encode(&hash[..16]))
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Seconds until expiry, for `Cache-Control: max-age`
    pub fn remaining_ttl_secs(&self) -> u64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Dashboard response cache
pub struct DashboardCache {
    entries: DashMap<DashboardKey, CacheEntry>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl DashboardCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Live entry for `key`; expired entries are dropped on read
    pub fn get(&self, key: DashboardKey) -> Option<CacheEntry> {
        if self.config.enabled {
            if let Some(entry) = self.entries.get(&key) {
                if !entry.is_expired() {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = key.as_str(), "Dashboard cache hit");
                    return Some(entry.clone());
                }
                drop(entry);
                self.entries.remove(&key);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = key.as_str(), "Dashboard cache miss");
        None
    }

    /// Store with the key's declared TTL
    pub fn set(&self, key: DashboardKey, data: Vec<u8>) -> Option<CacheEntry> {
        self.set_with_ttl(key, data, key.ttl())
    }

    pub fn set_with_ttl(&self, key: DashboardKey, data: Vec<u8>, ttl: Duration) -> Option<CacheEntry> {
        if !self.config.enabled {
            return None;
        }
        let entry = CacheEntry::new(data, ttl);
        debug!(key = key.as_str(), ttl_secs = ttl.as_secs(), "Dashboard cache set");
        self.entries.insert(key, entry.clone());
        Some(entry)
    }

    pub fn invalidate(&self, key: DashboardKey) -> bool {
        let removed = self.entries.remove(&key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(key = key.as_str(), "Dashboard cache invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        info!("Dashboard cache cleared");
    }

    /// Remove expired entries
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let count = before.saturating_sub(self.entries.len());
        if count > 0 {
            debug!(count = count, "Cleaned up expired dashboard entries");
        }
        count
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl Default for DashboardCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Spawn a background task to periodically cleanup expired entries
pub fn spawn_cleanup_task(cache: Arc<DashboardCache>) {
    let interval = cache.config.cleanup_interval;

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = cache.cleanup();
            let stats = cache.stats();
            debug!(
                removed = removed,
                entries = stats.entries,
                hit_rate = format!("{:.1}%", stats.hit_rate()),
                "Dashboard cache cleanup completed"
            );
        }
    });

    info!("Dashboard cache cleanup task started");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_is_stable() {
        let a = CacheEntry::new(b"{\"ok\":true}".to_vec(), Duration::from_secs(30));
        let b = CacheEntry::new(b"{\"ok\":true}".to_vec(), Duration::from_secs(30));
        let c = CacheEntry::new(b"{\"ok\":false}".to_vec(), Duration::from_secs(30));
        assert_eq!(a.etag, b.etag);
        assert_ne!(a.etag, c.etag);
    }

    #[test]
    fn test_get_set_invalidate() {
        let cache = DashboardCache::default();
        assert!(cache.get(DashboardKey::Companies).is_none());

        cache.set(DashboardKey::Companies, b"[]".to_vec());
        assert_eq!(cache.get(DashboardKey::Companies).unwrap().data, b"[]");
        assert!(cache.get(DashboardKey::Stats).is_none());

        assert!(cache.invalidate(DashboardKey::Companies));
        assert!(cache.get(DashboardKey::Companies).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.invalidations, 1);
    }

    #[test]
    fn test_expiry_and_cleanup() {
        let cache = DashboardCache::default();
        cache.set_with_ttl(DashboardKey::Stats, b"{}".to_vec(), Duration::from_millis(1));
        cache.set(DashboardKey::Settings, b"{}".to_vec());
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.cleanup(), 1);
        assert!(cache.get(DashboardKey::Stats).is_none());
        assert!(cache.get(DashboardKey::Settings).is_some());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = DashboardCache::new(CacheConfig::new(false));
        assert!(cache.set(DashboardKey::Stats, b"{}".to_vec()).is_none());
        assert!(cache.get(DashboardKey::Stats).is_none());
    }
}
