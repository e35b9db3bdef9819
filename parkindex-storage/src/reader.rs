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

//! Index Reader
//!
//! Resolves a search key into a [`Page`] of records.
//!
//! - **Point mode**: the key is either a primary identifier (its value is the
//!   blob) or a point-index key (its value is a primary identifier, one more
//!   hop to the blob). A missing key is an empty page with total `0`.
//! - **Range mode**: the key is a membership list. `LLEN` gives the total,
//!   then `LRANGE offset..=offset+page_size` (inclusive on both ends, so a
//!   page may carry `page_size + 1` records) and one `GET` per member.

use parkindex_core::{
    decode_record, is_point_redirect, IndexConfig, IndexError, Page, ReadError, Record,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::BackingStore;

type ReadResult<T> = std::result::Result<T, ReadError>;

#[derive(Clone)]
pub struct IndexReader {
    store: Arc<dyn BackingStore>,
    timeout: Duration,
}

impl IndexReader {
    pub fn new(store: Arc<dyn BackingStore>, config: &IndexConfig) -> Self {
        Self {
            store,
            timeout: config.operation_timeout(),
        }
    }

    /// Read one page under the configured deadline.
    ///
    /// `page_size <= 0` in range mode returns only the total. A negative
    /// `offset` is read as `0`.
    pub async fn read(
        &self,
        search_key: &str,
        multiple: bool,
        page_size: i64,
        offset: i64,
    ) -> ReadResult<Page> {
        self.read_within(search_key, multiple, page_size, offset, self.timeout)
            .await
    }

    pub async fn read_within(
        &self,
        search_key: &str,
        multiple: bool,
        page_size: i64,
        offset: i64,
        timeout: Duration,
    ) -> ReadResult<Page> {
        let offset = offset.max(0);
        let read = async {
            if multiple {
                self.read_range(search_key, page_size, offset).await
            } else {
                self.read_point(search_key, offset).await
            }
        };

        match tokio::time::timeout(timeout, read).await {
            Ok(result) => result,
            Err(_) => {
                warn!(search_key, ?timeout, "Index read timed out");
                Err(ReadError::new(0, IndexError::Timeout(timeout)))
            }
        }
    }

    async fn read_point(&self, search_key: &str, offset: i64) -> ReadResult<Page> {
        let value = match self.store.get(search_key).await.map_err(store_err(0))? {
            Some(value) => value,
            None => return Ok(Page::empty(0, offset)),
        };

        let (primary, blob) = if is_point_redirect(search_key) {
            let primary = String::from_utf8(value).map_err(|e| {
                ReadError::new(
                    0,
                    IndexError::Decode {
                        key: search_key.to_string(),
                        message: e.to_string(),
                    },
                )
            })?;
            match self.store.get(&primary).await.map_err(store_err(0))? {
                Some(blob) => (primary, blob),
                None => {
                    warn!(search_key, primary = %primary, "Point index references a missing record");
                    return Ok(Page::empty(0, offset));
                }
            }
        } else {
            (search_key.to_string(), value)
        };

        // The blob exists, so the total is already known to be one.
        let record = decode_record(&primary, &blob).map_err(|e| ReadError::new(1, e))?;
        Ok(Page::new(vec![record], 1, offset))
    }

    /// Members whose blob is missing are skipped, so the page can hold fewer
    /// records than the `LRANGE` window while `size` still counts them.
    async fn read_range(&self, search_key: &str, page_size: i64, offset: i64) -> ReadResult<Page> {
        let total = self.store.llen(search_key).await.map_err(store_err(0))?;

        if page_size <= 0 || offset > total {
            return Ok(Page::empty(total, offset));
        }

        let stop = offset.saturating_add(page_size);
        let members = self
            .store
            .lrange(search_key, offset, stop)
            .await
            .map_err(store_err(total))?;

        let mut records: Vec<Record> = Vec::with_capacity(members.len());
        for member in members {
            let primary = String::from_utf8(member).map_err(|e| {
                ReadError::new(
                    total,
                    IndexError::Decode {
                        key: search_key.to_string(),
                        message: e.to_string(),
                    },
                )
            })?;
            match self.store.get(&primary).await.map_err(store_err(total))? {
                Some(blob) => {
                    let record =
                        decode_record(&primary, &blob).map_err(|e| ReadError::new(total, e))?;
                    records.push(record);
                }
                None => {
                    warn!(search_key, primary = %primary, "Membership index references a missing record");
                }
            }
        }

        debug!(search_key, total, offset, returned = records.len(), "Range read");
        Ok(Page::new(records, total, offset))
    }
}

fn store_err(total: i64) -> impl Fn(crate::backend::StoreError) -> ReadError {
    move |e| ReadError::new(total, e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::writer::IndexWriter;

    async fn seeded(records: &[Record]) -> (MemoryStore, IndexReader) {
        let store = MemoryStore::new();
        let config = IndexConfig::default();
        IndexWriter::new(Arc::new(store.clone()), &config)
            .write(records)
            .await
            .unwrap();
        let reader = IndexReader::new(Arc::new(store.clone()), &config);
        (store, reader)
    }

    fn parks(n: i64) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(format!("sys{}", i), 100 + i, i, i, "park", "parking"))
            .collect()
    }

    #[tokio::test]
    async fn test_point_read_by_primary_and_index() {
        let record = Record::new("sys1", 42, 7, 8, "park", "parking");
        let (_, reader) = seeded(std::slice::from_ref(&record)).await;

        let page = reader.read("sys1", false, 5, 0).await.unwrap();
        assert_eq!(page.data, vec![record.clone()]);
        assert_eq!(page.size, 1);

        let page = reader.read("global_id:42", false, 5, 0).await.unwrap();
        assert_eq!(page.data, vec![record]);
    }

    #[tokio::test]
    async fn test_point_read_missing_is_empty() {
        let (_, reader) = seeded(&[]).await;
        let page = reader.read("global_id:999", false, 5, 0).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.size, 0);
    }

    #[tokio::test]
    async fn test_range_page_is_inclusive() {
        let (_, reader) = seeded(&parks(12)).await;

        let page = reader.read("mode:park", true, 5, 0).await.unwrap();
        assert_eq!(page.size, 12);
        assert_eq!(page.data.len(), 6);
        assert_eq!(page.data[0].system_object_id, "sys0");
        assert_eq!(page.data[5].system_object_id, "sys5");
    }

    #[tokio::test]
    async fn test_range_page_size_zero_returns_total_only() {
        let (store, reader) = seeded(&parks(3)).await;
        let before = store.stats().range_reads;

        let page = reader.read("mode:park", true, 0, 0).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.size, 3);
        // Only LLEN, no LRANGE.
        assert_eq!(store.stats().range_reads, before + 1);
    }

    #[tokio::test]
    async fn test_range_offset_past_total() {
        let (_, reader) = seeded(&parks(3)).await;
        let page = reader.read("mode:park", true, 5, 10).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.size, 3);
        assert_eq!(page.offset, 10);
    }

    #[tokio::test]
    async fn test_negative_offset_reads_from_start() {
        let (_, reader) = seeded(&parks(3)).await;
        let page = reader.read("mode:park", true, 5, -4).await.unwrap();
        assert_eq!(page.offset, 0);
        assert_eq!(page.data.len(), 3);
    }

    #[tokio::test]
    async fn test_range_decode_failure_keeps_total() {
        let (store, reader) = seeded(&parks(2)).await;
        store.set("sys1", b"not json", None).await.unwrap();

        let err = reader.read("mode:park", true, 5, 0).await.unwrap_err();
        assert_eq!(err.total, 2);
        assert!(matches!(err.source, IndexError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_dangling_member_is_skipped() {
        let (store, reader) = seeded(&parks(1)).await;
        store.rpush("mode:park", b"ghost").await.unwrap();

        let page = reader.read("mode:park", true, 5, 0).await.unwrap();
        assert_eq!(page.size, 2);
        assert_eq!(page.data.len(), 1);
    }

    #[tokio::test]
    async fn test_point_decode_failure_reports_found_record() {
        let (store, reader) = seeded(&[Record::new("sys1", 42, 7, 7, "park", "parking")]).await;
        store.set("sys1", b"not json", None).await.unwrap();

        for key in ["sys1", "global_id:42"] {
            let err = reader.read(key, false, 5, 0).await.unwrap_err();
            assert_eq!(err.total, 1);
            assert!(matches!(err.source, IndexError::Decode { .. }));
        }
    }
}
