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

use anyhow::Result;
use parkindex_core::IndexConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingestion::MAX_DOCUMENT_BYTES;

/// Parkindex Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Largest accepted request body and remote document, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Timeout for fetching a remote document, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    MAX_DOCUMENT_BYTES
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            max_body_bytes: default_max_body_bytes(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl HttpServerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Read `name` and parse it, ignoring unset or unparsable values.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - PARKINDEX_HTTP_ADDR: HTTP listen address (default: 0.0.0.0:8080)
    /// - PARKINDEX_MAX_BODY_BYTES: Request body / remote document limit (default: 32 MiB)
    /// - PARKINDEX_FETCH_TIMEOUT: Remote document timeout in seconds (default: 30)
    /// - PARKINDEX_MAX_RETRIES: Write attempts per transaction (default: 3)
    /// - PARKINDEX_PAGE_SIZE: Range lookup page size (default: 5)
    /// - PARKINDEX_CACHE_TTL: Result cache TTL in seconds (default: 300)
    /// - PARKINDEX_OPERATION_TIMEOUT_MS: Deadline per index read or write (default: 5000)
    /// - PARKINDEX_INGEST_CONCURRENCY: Concurrent record saves (default: 8)
    pub fn from_env() -> Self {
        Self::merge_with_env(Self::default())
    }

    /// Load configuration with priority: file > env > defaults
    ///
    /// Environment variables that are set still override file values, the
    /// same way CLI flags override both.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        Ok(Self::merge_with_env(config))
    }

    /// Overlay every environment variable that is explicitly set
    fn merge_with_env(mut config: Self) -> Self {
        if let Ok(addr) = std::env::var("PARKINDEX_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }
        if let Some(v) = env_parse("PARKINDEX_MAX_BODY_BYTES") {
            config.server.max_body_bytes = v;
        }
        if let Some(v) = env_parse("PARKINDEX_FETCH_TIMEOUT") {
            config.server.fetch_timeout_secs = v;
        }
        if let Some(v) = env_parse("PARKINDEX_MAX_RETRIES") {
            config.index.max_retries = v;
        }
        if let Some(v) = env_parse("PARKINDEX_PAGE_SIZE") {
            config.index.page_size = v;
        }
        if let Some(v) = env_parse("PARKINDEX_CACHE_TTL") {
            config.index.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("PARKINDEX_OPERATION_TIMEOUT_MS") {
            config.index.operation_timeout_ms = v;
        }
        if let Some(v) = env_parse("PARKINDEX_INGEST_CONCURRENCY") {
            config.index.ingest_concurrency = v;
        }
        config
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.server.max_body_bytes == 0 {
            anyhow::bail!("server.max_body_bytes must be greater than 0");
        }
        if self.index.operation_timeout_ms == 0 {
            anyhow::bail!("index.operation_timeout_ms must be greater than 0");
        }
        if self.index.cache_max_entries == 0 {
            anyhow::bail!("index.cache_max_entries must be greater than 0");
        }

        Ok(())
    }
}
