//! Response cache for the super-admin dashboard
//!
//! Each dashboard read has a fixed key and TTL (see [`DashboardKey`]).
//! Entries expire by TTL, are skipped by a `?refresh=true` request, and are
//! invalidated explicitly when the data behind them changes.

pub mod store;

pub use store::{spawn_cleanup_task, CacheEntry, CacheStats, DashboardCache};

use std::time::Duration;

/// Cached dashboard reads and their TTLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardKey {
    Stats,
    Companies,
    DashboardData,
    Settings,
}

impl DashboardKey {
    pub const ALL: [DashboardKey; 4] = [
        DashboardKey::Stats,
        DashboardKey::Companies,
        DashboardKey::DashboardData,
        DashboardKey::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardKey::Stats => "stats",
            DashboardKey::Companies => "companies",
            DashboardKey::DashboardData => "dashboard-data",
            DashboardKey::Settings => "settings",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            DashboardKey::Stats => Duration::from_secs(30),
            DashboardKey::Companies => Duration::from_secs(60),
            DashboardKey::DashboardData => Duration::from_secs(120),
            DashboardKey::Settings => Duration::from_secs(600),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every read is a miss and writes are dropped
    pub enabled: bool,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }
}
