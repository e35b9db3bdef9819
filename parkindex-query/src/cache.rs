// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Result Cache
//!
//! Pages returned by the read path, kept for a per-entry time-to-live.
//!
//! ## Cache Key
//!
//! ```text
//! key = {search_key}@{offset}+{page_size}
//! ```
//!
//! ## Staleness
//!
//! Writes never invalidate entries. A page may be stale for up to its TTL
//! after a write touching the same index key.

use moka::sync::Cache;
use moka::Expiry;
use parkindex_core::Page;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Build the cache key for one page request.
pub fn page_key(search_key: &str, offset: i64, page_size: i64) -> String {
    format!("{}@{}+{}", search_key, offset, page_size)
}

#[derive(Debug, Clone)]
struct CachedPage {
    page: Page,
    ttl: Duration,
}

/// Expires each entry after the TTL it was inserted with.
struct PageExpiry;

impl Expiry<String, CachedPage> for PageExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedPage,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedPage,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
    /// Approximate; pending evictions may not be reflected yet
    pub entry_count: u64,
}

pub struct ResultCache {
    cache: Cache<String, CachedPage>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(max_entries: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PageExpiry)
            .build();

        Self {
            cache,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a page, counting the hit or miss. Expired entries are absent.
    pub fn get(&self, key: &str) -> Option<Page> {
        match self.peek(key) {
            Some(page) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(page)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Look up a page without touching the statistics.
    pub fn peek(&self, key: &str) -> Option<Page> {
        self.cache.get(key).map(|cached| cached.page)
    }

    /// Store a page that expires after `ttl`.
    pub fn set(&self, key: impl Into<String>, page: Page, ttl: Duration) {
        self.cache.insert(key.into(), CachedPage { page, ttl });
    }

    /// Store a page with the default TTL.
    pub fn insert(&self, key: impl Into<String>, page: Page) {
        self.set(key, page, self.default_ttl);
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Apply pending evictions now.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            hit_rate,
            entry_count: self.cache.entry_count(),
        }
    }

    /// Start a background task that flushes expired entries every `interval`.
    ///
    /// Runs until the returned handle is aborted. Must be called from within a
    /// tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.run_pending_tasks();
                debug!(entries = cache.entry_count(), "Result cache swept");
            }
        })
    }
}
