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

//! Configuration for the index engine
//!
//! Tunables for the write retry budget, read paging, the result cache and
//! ingestion fan-out. Every field has a serde default so partial TOML
//! sections are accepted.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default optimistic-transaction attempts per write call
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of membership entries requested per page
pub const DEFAULT_PAGE_SIZE: i64 = 5;

/// Default result cache TTL (5 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;

/// Default result cache capacity
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Attempts per write before surfacing a write conflict.
    /// Zero is treated as a single attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Page size used by the search path for range lookups
    #[serde(default = "default_page_size")]
    pub page_size: i64,

    /// Lifetime of a cached page in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached pages
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,

    /// Interval of the background cache sweep in seconds
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,

    /// Deadline applied to every backing-store read or write call
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Maximum number of records saved concurrently during ingestion
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_cache_max_entries() -> u64 {
    DEFAULT_CACHE_MAX_ENTRIES
}

fn default_cache_sweep_interval_secs() -> u64 {
    60
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_ingest_concurrency() -> usize {
    8
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            page_size: default_page_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            cache_sweep_interval_secs: default_cache_sweep_interval_secs(),
            operation_timeout_ms: default_operation_timeout_ms(),
            ingest_concurrency: default_ingest_concurrency(),
        }
    }
}

impl IndexConfig {
    /// Attempts actually made by the writer (never zero).
    pub fn write_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn ingest_concurrency(&self) -> usize {
        self.ingest_concurrency.max(1)
    }
}
