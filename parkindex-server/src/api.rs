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

//! HTTP adapters over the search engine and the ingestor.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parkindex_core::{IndexError, Page, ReadError, SearchQuery};
use parkindex_query::{CacheStats, SearchEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::HttpServerConfig;
use crate::ingestion::{decode_record_array, fetch_from_url, IngestError, IngestReport, Ingestor};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::RequestTimeout(msg) => (StatusCode::REQUEST_TIMEOUT, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        let message = err.to_string();
        match err {
            IndexError::InvalidQuery(_) => ApiError::BadRequest(message),
            IndexError::Timeout(_) => ApiError::RequestTimeout(message),
            IndexError::WriteConflict { .. } => ApiError::Conflict(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl From<ReadError> for ApiError {
    fn from(err: ReadError) -> Self {
        err.source.into()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::InvalidUrl { .. }
            | IngestError::Decode(_)
            | IngestError::TooLarge { .. }
            | IngestError::UnsupportedContentType(_) => ApiError::BadRequest(message),
            IngestError::Fetch(_) | IngestError::Status(_) => ApiError::Internal(message),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub ingestor: Ingestor,
    pub http_client: reqwest::Client,
    pub config: Arc<HttpServerConfig>,
    pub started_at: Instant,
}

/// POST /api/search - Look up one page by the highest-priority identifier
pub async fn search(
    State(state): State<AppState>,
    Json(query): Json<SearchQuery>,
) -> Result<Json<Page>, ApiError> {
    let page = state.engine.search(&query).await.map_err(|e| {
        error!(error = %e, total = e.total, "Search failed");
        ApiError::from(e)
    })?;
    debug!(size = page.size, returned = page.data.len(), "Search served");
    Ok(Json(page))
}

/// Response for the load endpoints
#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(flatten)]
    pub report: IngestReport,
}

impl From<IngestReport> for LoadResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            total: report.total(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            report,
        }
    }
}

/// POST /api/load_json - Ingest a JSON array of records from the request body
pub async fn load_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LoadResponse>, ApiError> {
    let records = decode_record_array(&body)?;
    let report = state.ingestor.ingest(records).await;
    Ok(Json(report.into()))
}

#[derive(Debug, Deserialize)]
pub struct LoadFromUrlRequest {
    pub url: String,
}

/// POST /api/load_from_url - Fetch a JSON array of records and ingest it
pub async fn load_from_url(
    State(state): State<AppState>,
    Json(request): Json<LoadFromUrlRequest>,
) -> Result<Json<LoadResponse>, ApiError> {
    let body = fetch_from_url(&state.http_client, &request.url, state.config.max_body_bytes)
        .await
        .map_err(|e| {
            error!(url = %request.url, error = %e, "Failed to load document");
            ApiError::from(e)
        })?;
    let records = decode_record_array(&body)?;
    let report = state.ingestor.ingest(records).await;
    Ok(Json(report.into()))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache: CacheHealth,
}

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl From<CacheStats> for CacheHealth {
    fn from(stats: CacheStats) -> Self {
        Self {
            entries: stats.entry_count,
            hits: stats.hits,
            misses: stats.misses,
            hit_rate: stats.hit_rate,
        }
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        cache: state.engine.cache().stats().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_index_error_mapping() {
        assert_eq!(
            status_of(IndexError::InvalidQuery("empty".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(IndexError::Timeout(Duration::from_secs(1)).into()),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            status_of(IndexError::WriteConflict { attempts: 3 }.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(IndexError::Store("down".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_read_error_uses_source() {
        let err = ReadError::new(12, IndexError::Decode {
            key: "sys1".into(),
            message: "eof".into(),
        });
        assert_eq!(status_of(err.into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_ingest_error_mapping() {
        assert_eq!(
            status_of(IngestError::UnsupportedContentType("text/html".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(IngestError::Status(503).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
