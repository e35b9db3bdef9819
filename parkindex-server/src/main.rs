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
use clap::Parser;
use parkindex_server::{config::ServerConfig, run_server};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long, env = "PARKINDEX_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Write attempts per transaction
    #[arg(long)]
    max_retries: Option<u32>,

    /// Page size for range lookups
    #[arg(long)]
    page_size: Option<i64>,

    /// Result cache TTL in seconds
    #[arg(long)]
    cache_ttl_secs: Option<u64>,

    /// Concurrent record saves during ingestion
    #[arg(long)]
    ingest_concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ServerConfig::load(args.config)?;

    // Apply CLI overrides
    if let Some(addr) = args.http_addr {
        config.server.listen_addr = addr;
    }
    if let Some(max_retries) = args.max_retries {
        config.index.max_retries = max_retries;
    }
    if let Some(page_size) = args.page_size {
        config.index.page_size = page_size;
    }
    if let Some(ttl) = args.cache_ttl_secs {
        config.index.cache_ttl_secs = ttl;
    }
    if let Some(concurrency) = args.ingest_concurrency {
        config.index.ingest_concurrency = concurrency;
    }

    run_server(config).await
}
