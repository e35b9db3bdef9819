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

pub mod api;
pub mod config;
pub mod ingestion;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use parkindex_query::SearchEngine;
use parkindex_storage::{BackingStore, IndexReader, IndexWriter, MemoryStore};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{health_check, load_from_url, load_json, search, AppState};
use config::ServerConfig;
use ingestion::Ingestor;

/// Wire the writer, reader, engine and ingestor over `store`.
pub fn build_state(config: &ServerConfig, store: Arc<dyn BackingStore>) -> Result<AppState> {
    let writer = IndexWriter::new(store.clone(), &config.index);
    let reader = IndexReader::new(store, &config.index);
    let engine = SearchEngine::new(reader, &config.index);
    let ingestor = Ingestor::new(Arc::new(writer), config.index.ingest_concurrency());

    let http_client = reqwest::Client::builder()
        .timeout(config.server.fetch_timeout())
        .build()?;

    Ok(AppState {
        engine: Arc::new(engine),
        ingestor,
        http_client,
        config: Arc::new(config.server.clone()),
        started_at: Instant::now(),
    })
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/search", post(search))
        .route("/api/load_json", post(load_json))
        .route("/api/load_from_url", post(load_from_url))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parkindex_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Parkindex Server");
    config.validate()?;
    let addr = config.socket_addr()?;

    let store: Arc<dyn BackingStore> = Arc::new(MemoryStore::new());
    let state = build_state(&config, store)?;
    let sweeper = state
        .engine
        .cache()
        .spawn_sweeper(config.index.cache_sweep_interval());

    tracing::info!(
        page_size = config.index.page_size,
        cache_ttl_secs = config.index.cache_ttl_secs,
        max_retries = config.index.max_retries,
        "Index engine ready"
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        futures::future::pending::<()>().await;
    }
}
