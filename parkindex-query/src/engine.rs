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

//! Search Engine
//!
//! The composed read path every lookup goes through:
//!
//! ```text
//! cache hit ──────────────────────────────────────────────▶ page
//! cache miss ─▶ coalescer(key) ─▶ cache re-check ─▶ hit ──▶ page
//!                                              └─▶ miss ─▶ reader ─▶ cache ─▶ page
//! ```
//!
//! Only successful reads populate the cache.

use parkindex_core::{IndexConfig, Page, ReadError, SearchQuery};
use parkindex_storage::IndexReader;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{page_key, ResultCache};
use crate::coalesce::Coalescer;

pub struct SearchEngine {
    reader: IndexReader,
    cache: Arc<ResultCache>,
    coalescer: Coalescer<Page, ReadError>,
    page_size: i64,
}

impl SearchEngine {
    pub fn new(reader: IndexReader, config: &IndexConfig) -> Self {
        let cache = Arc::new(ResultCache::new(
            config.cache_max_entries,
            config.cache_ttl(),
        ));
        Self::with_cache(reader, cache, config)
    }

    /// Use an existing cache; pages are stored with its default TTL.
    pub fn with_cache(reader: IndexReader, cache: Arc<ResultCache>, config: &IndexConfig) -> Self {
        Self {
            reader,
            cache,
            coalescer: Coalescer::new(),
            page_size: config.page_size,
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Classify a query and look up its page.
    ///
    /// Membership identifiers (`Mode`, `Mode_en`) are read in range mode with
    /// the configured page size; every other identifier is a point read.
    pub async fn search(&self, query: &SearchQuery) -> Result<Page, ReadError> {
        let key = query.index_key().map_err(ReadError::from)?;
        self.lookup(&key.to_string(), key.is_membership(), self.page_size, query.offset)
            .await
    }

    /// Look up one page through the cache and the coalescer.
    pub async fn lookup(
        &self,
        search_key: &str,
        multiple: bool,
        page_size: i64,
        offset: i64,
    ) -> Result<Page, ReadError> {
        let offset = offset.max(0);
        let cache_key = page_key(search_key, offset, page_size);

        if let Some(page) = self.cache.get(&cache_key) {
            debug!(cache_key = %cache_key, "Result cache hit");
            return Ok(page);
        }

        let reader = self.reader.clone();
        let cache = self.cache.clone();
        let owned_key = search_key.to_string();
        let owned_cache_key = cache_key.clone();

        let (result, shared) = self
            .coalescer
            .run(&cache_key, move || async move {
                if let Some(page) = cache.peek(&owned_cache_key) {
                    return Ok(page);
                }
                let result = reader.read(&owned_key, multiple, page_size, offset).await;
                if let Ok(page) = &result {
                    cache.insert(owned_cache_key, page.clone());
                }
                result
            })
            .await;

        debug!(cache_key = %cache_key, shared, ok = result.is_ok(), "Read path completed");
        result
    }
}
