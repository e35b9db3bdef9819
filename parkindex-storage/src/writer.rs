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

//! Index Writer
//!
//! Installs a batch of records and all of their derived index entries in one
//! optimistic transaction:
//!
//! ```text
//! WATCH  {primary, global_id:*, id:*, id_en:*, mode:*, mode_en:*} for every record
//! GET    {primary}                       (registers the read, result discarded)
//! MULTI
//!   SET    {primary}   <- blob
//!   SET    global_id:* <- primary
//!   SET    id:*        <- primary
//!   SET    id_en:*     <- primary
//!   RPUSH  mode:*      <- primary
//!   RPUSH  mode_en:*   <- primary
//! EXEC   (conflict -> retry from WATCH, up to the retry budget)
//! ```
//!
//! Membership lists are not deduplicated: writing the same record twice
//! appends its primary identifier twice.

use parkindex_core::{encode_record, DerivedKeys, IndexConfig, IndexError, Record, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{BackingStore, StoreError, StoreResult, TxOp};

/// One record, encoded and keyed, ready to be queued.
struct PreparedRecord {
    keys: DerivedKeys,
    blob: Vec<u8>,
}

struct WriteBatch {
    records: Vec<PreparedRecord>,
    watch_keys: Vec<String>,
}

impl WriteBatch {
    fn prepare(records: &[Record]) -> Result<Self> {
        let mut prepared = Vec::with_capacity(records.len());
        let mut watch_keys = Vec::with_capacity(records.len() * 6);

        for record in records {
            let keys = record.derived_keys();
            let blob = encode_record(record)?;
            watch_keys.extend(keys.all().iter().map(|k| k.to_string()));
            prepared.push(PreparedRecord { keys, blob });
        }

        Ok(Self {
            records: prepared,
            watch_keys,
        })
    }

    fn ops(&self) -> Vec<TxOp> {
        let mut ops = Vec::with_capacity(self.records.len() * 6);
        for record in &self.records {
            let primary = record.keys.primary.as_bytes();
            ops.push(TxOp::set(record.keys.primary.clone(), record.blob.clone()));
            for key in record.keys.point_keys() {
                ops.push(TxOp::set(key, primary));
            }
            for key in record.keys.membership_keys() {
                ops.push(TxOp::rpush(key, primary));
            }
        }
        ops
    }
}

/// Transactional writer for records and their derived indices.
#[derive(Clone)]
pub struct IndexWriter {
    store: Arc<dyn BackingStore>,
    attempts: u32,
    timeout: Duration,
}

impl IndexWriter {
    pub fn new(store: Arc<dyn BackingStore>, config: &IndexConfig) -> Self {
        Self {
            store,
            attempts: config.write_attempts(),
            timeout: config.operation_timeout(),
        }
    }

    /// Write a batch under the configured deadline.
    pub async fn write(&self, records: &[Record]) -> Result<()> {
        self.write_within(records, self.timeout).await
    }

    pub async fn write_one(&self, record: &Record) -> Result<()> {
        self.write(std::slice::from_ref(record)).await
    }

    /// Write a batch, failing with [`IndexError::Timeout`] once `timeout`
    /// elapses. The deadline covers all conflict retries; a timeout is never
    /// retried.
    pub async fn write_within(&self, records: &[Record], timeout: Duration) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let batch = WriteBatch::prepare(records)?;

        match tokio::time::timeout(timeout, self.commit_with_retry(&batch)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(records = records.len(), ?timeout, "Index write timed out");
                Err(IndexError::Timeout(timeout))
            }
        }
    }

    async fn commit_with_retry(&self, batch: &WriteBatch) -> Result<()> {
        for attempt in 1..=self.attempts {
            match self.try_commit(batch).await {
                Ok(()) => {
                    debug!(records = batch.records.len(), attempt, "Index write committed");
                    return Ok(());
                }
                Err(StoreError::Conflict) => {
                    debug!(attempt, max_attempts = self.attempts, "Index write conflicted");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            records = batch.records.len(),
            attempts = self.attempts,
            "Index write gave up after repeated conflicts"
        );
        Err(IndexError::WriteConflict {
            attempts: self.attempts,
        })
    }

    async fn try_commit(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut txn = self.store.watch(&batch.watch_keys).await?;
        for record in &batch.records {
            txn.get(&record.keys.primary).await?;
        }
        txn.exec(batch.ops()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn writer(store: &MemoryStore) -> IndexWriter {
        IndexWriter::new(Arc::new(store.clone()), &IndexConfig::default())
    }

    #[tokio::test]
    async fn test_write_installs_six_entries() {
        let store = MemoryStore::new();
        let record = Record::new("sys1", 42, 7, 8, "park", "parking");
        writer(&store).write_one(&record).await.unwrap();

        assert!(store.get("sys1").await.unwrap().is_some());
        assert_eq!(store.get("global_id:42").await.unwrap(), Some(b"sys1".to_vec()));
        assert_eq!(store.get("id:7").await.unwrap(), Some(b"sys1".to_vec()));
        assert_eq!(store.get("id_en:8").await.unwrap(), Some(b"sys1".to_vec()));
        assert_eq!(store.lrange("mode:park", 0, -1).await.unwrap(), vec![b"sys1".to_vec()]);
        assert_eq!(store.lrange("mode_en:parking", 0, -1).await.unwrap(), vec![b"sys1".to_vec()]);
        assert_eq!(store.stats().commits, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = MemoryStore::new();
        writer(&store).write(&[]).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.stats().commits, 0);
    }

    #[tokio::test]
    async fn test_batch_is_one_transaction() {
        let store = MemoryStore::new();
        let records = vec![
            Record::new("a", 1, 1, 1, "park", "parking"),
            Record::new("b", 2, 2, 2, "park", "parking"),
        ];
        writer(&store).write(&records).await.unwrap();

        assert_eq!(store.stats().commits, 1);
        assert_eq!(store.llen("mode:park").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rewrite_appends_duplicate_membership() {
        let store = MemoryStore::new();
        let w = writer(&store);
        let record = Record::new("sys1", 42, 7, 7, "park", "parking");
        w.write_one(&record).await.unwrap();
        w.write_one(&record).await.unwrap();

        // Point indices are overwritten, membership grows.
        assert_eq!(store.get("global_id:42").await.unwrap(), Some(b"sys1".to_vec()));
        assert_eq!(store.llen("mode:park").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_point_index_last_writer_wins() {
        let store = MemoryStore::new();
        let w = writer(&store);
        w.write_one(&Record::new("old", 42, 1, 1, "a", "a")).await.unwrap();
        w.write_one(&Record::new("new", 42, 2, 2, "a", "a")).await.unwrap();

        assert_eq!(store.get("global_id:42").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_store_error_is_not_retried() {
        let store = MemoryStore::new();
        store.set("mode:park", b"not a list", None).await.unwrap();

        let err = writer(&store)
            .write_one(&Record::new("sys1", 1, 1, 1, "park", "parking"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
        assert_eq!(store.stats().conflicts, 0);
        assert_eq!(store.get("sys1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_batch_type_clash_between_records_writes_nothing() {
        let store = MemoryStore::new();
        // The first record's primary is the second record's membership key.
        let records = vec![
            Record::new("mode:park", 1, 1, 1, "lot", "lot"),
            Record::new("sys2", 2, 2, 2, "park", "parking"),
        ];
        let err = writer(&store).write(&records).await.unwrap_err();

        assert!(matches!(err, IndexError::Store(_)));
        assert!(store.is_empty());
        assert_eq!(store.stats().commits, 0);
    }
}
