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

//! Record Ingestion
//!
//! Decodes record documents and saves them through a [`RecordSink`] with a
//! bounded number of saves in flight.
//!
//! ## Flow
//!
//! ```text
//! JSON body ─┐
//!            ├─► decode_record_array ─► Ingestor ─► RecordSink (N in flight)
//! URL ───────┘        (fetch_from_url)       │
//!                                            └─► IngestReport (one outcome per record)
//! ```

use futures::stream::{self, StreamExt};
use parkindex_core::Record;
use parkindex_storage::RecordSink;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Largest accepted remote document (32 MiB)
pub const MAX_DOCUMENT_BYTES: usize = 32 << 20;

const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["application/json", "application/octet-stream"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Failed to fetch document: {0}")]
    Fetch(String),

    #[error("Remote server answered with status {0}")]
    Status(u16),

    #[error("Document exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Unsupported Content-Type: {0}")]
    UnsupportedContentType(String),

    #[error("Document is not a JSON array of records: {0}")]
    Decode(String),
}

/// Outcome of saving one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub system_object_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-record results of one ingestion, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }
}

/// Saves records one per call with at most `concurrency` calls in flight.
#[derive(Clone)]
pub struct Ingestor {
    sink: Arc<dyn RecordSink>,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(sink: Arc<dyn RecordSink>, concurrency: usize) -> Self {
        Self {
            sink,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn ingest(&self, records: Vec<Record>) -> IngestReport {
        let total = records.len();
        let outcomes: Vec<RecordOutcome> = stream::iter(records)
            .map(|record| {
                let sink = self.sink.clone();
                async move {
                    let error = match sink.save(std::slice::from_ref(&record)).await {
                        Ok(()) => None,
                        Err(e) => {
                            warn!(system_object_id = %record.system_object_id, error = %e, "Failed to save record");
                            Some(e.to_string())
                        }
                    };
                    RecordOutcome {
                        system_object_id: record.system_object_id,
                        error,
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = IngestReport { outcomes };
        info!(
            total,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Ingestion finished"
        );
        report
    }
}

/// Decode a JSON array of record objects.
pub fn decode_record_array(bytes: &[u8]) -> Result<Vec<Record>, IngestError> {
    serde_json::from_slice(bytes).map_err(|e| IngestError::Decode(e.to_string()))
}

/// Whether a `Content-Type` header names an accepted document type.
/// Parameters such as `charset` are ignored.
pub fn is_accepted_content_type(value: &str) -> bool {
    let media_type = value.split(';').next().unwrap_or("").trim();
    ACCEPTED_CONTENT_TYPES
        .iter()
        .any(|accepted| media_type.eq_ignore_ascii_case(accepted))
}

/// Download a record document, enforcing the size limit and content type.
pub async fn fetch_from_url(
    client: &reqwest::Client,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, IngestError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| IngestError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(IngestError::InvalidUrl {
            url: url.to_string(),
            message: format!("unsupported scheme {}", parsed.scheme()),
        });
    }

    let mut response = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| IngestError::Fetch(e.to_string()))?;

    if !response.status().is_success() {
        return Err(IngestError::Status(response.status().as_u16()));
    }
    if response.content_length().map(|len| len > limit as u64).unwrap_or(false) {
        return Err(IngestError::TooLarge { limit });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !is_accepted_content_type(&content_type) {
        return Err(IngestError::UnsupportedContentType(content_type));
    }

    // Content-Length may be absent or wrong; count what actually arrives.
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| IngestError::Fetch(e.to_string()))?
    {
        if body.len() + chunk.len() > limit {
            return Err(IngestError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    debug!(url, bytes = body.len(), "Fetched record document");
    Ok(body)
}
