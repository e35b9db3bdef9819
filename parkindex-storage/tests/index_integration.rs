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

//! Integration tests for the index writer and reader

use async_trait::async_trait;
use parkindex_core::{IndexConfig, IndexError, Record};
use parkindex_storage::{
    BackingStore, IndexReader, IndexWriter, MemoryStore, StoreError, StoreResult, TxOp, WatchTxn,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a `MemoryStore` and fails the next `conflicts` commits.
struct ConflictingStore {
    inner: MemoryStore,
    conflicts: AtomicU32,
}

impl ConflictingStore {
    fn new(inner: MemoryStore, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
        }
    }
}

struct ConflictingTxn {
    inner: Box<dyn WatchTxn>,
    fail: bool,
}

#[async_trait]
impl WatchTxn for ConflictingTxn {
    async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn exec(self: Box<Self>, ops: Vec<TxOp>) -> StoreResult<()> {
        if self.fail {
            return Err(StoreError::Conflict);
        }
        self.inner.exec(ops).await
    }
}

#[async_trait]
impl BackingStore for ConflictingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> StoreResult<i64> {
        self.inner.rpush(key, value).await
    }

    async fn llen(&self, key: &str) -> StoreResult<i64> {
        self.inner.llen(key).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>> {
        self.inner.lrange(key, start, stop).await
    }

    async fn watch(&self, keys: &[String]) -> StoreResult<Box<dyn WatchTxn>> {
        let fail = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(Box::new(ConflictingTxn {
            inner: self.inner.watch(keys).await?,
            fail,
        }))
    }
}

/// Delays every `GET`, `LLEN` and `WATCH`.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl BackingStore for SlowStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> StoreResult<i64> {
        self.inner.rpush(key, value).await
    }

    async fn llen(&self, key: &str) -> StoreResult<i64> {
        tokio::time::sleep(self.delay).await;
        self.inner.llen(key).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>> {
        self.inner.lrange(key, start, stop).await
    }

    async fn watch(&self, keys: &[String]) -> StoreResult<Box<dyn WatchTxn>> {
        tokio::time::sleep(self.delay).await;
        self.inner.watch(keys).await
    }
}

fn park(n: i64) -> Record {
    Record::new(format!("sys{}", n), 1000 + n, n, n, "park", "parking")
}

/// The canonical scenario: one record, reachable through every index.
#[tokio::test]
async fn test_record_reachable_through_every_index() {
    let store = MemoryStore::new();
    let config = IndexConfig::default();
    let writer = IndexWriter::new(Arc::new(store.clone()), &config);
    let reader = IndexReader::new(Arc::new(store.clone()), &config);

    let record = Record::new("sys1", 42, 7, 7, "park", "parking")
        .with_field("Name", serde_json::json!("Lot 7"));
    writer.write_one(&record).await.unwrap();

    for key in ["sys1", "global_id:42", "id:7", "id_en:7"] {
        let page = reader.read(key, false, 5, 0).await.unwrap();
        assert_eq!(page.size, 1, "key {}", key);
        assert_eq!(page.data, vec![record.clone()], "key {}", key);
    }

    for key in ["mode:park", "mode_en:parking"] {
        let page = reader.read(key, true, 5, 0).await.unwrap();
        assert_eq!(page.size, 1, "key {}", key);
        assert_eq!(page.data, vec![record.clone()], "key {}", key);
    }
}

/// Pagination over a 12-member list with page size 5.
#[tokio::test]
async fn test_pagination_boundaries() {
    let store = MemoryStore::new();
    let config = IndexConfig::default();
    let writer = IndexWriter::new(Arc::new(store.clone()), &config);
    let reader = IndexReader::new(Arc::new(store.clone()), &config);

    let records: Vec<Record> = (0..12).map(park).collect();
    writer.write(&records).await.unwrap();

    let ids = |offset| {
        let reader = reader.clone();
        async move {
            let page = reader.read("mode:park", true, 5, offset).await.unwrap();
            assert_eq!(page.size, 12);
            page.data
                .into_iter()
                .map(|r| r.system_object_id)
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(ids(0).await, ["sys0", "sys1", "sys2", "sys3", "sys4", "sys5"]);
    assert_eq!(ids(5).await, ["sys5", "sys6", "sys7", "sys8", "sys9", "sys10"]);
    assert_eq!(ids(10).await, ["sys10", "sys11"]);
    assert!(ids(12).await.is_empty());
    assert!(ids(13).await.is_empty());
}

#[tokio::test]
async fn test_conflict_is_retried() {
    let memory = MemoryStore::new();
    let store = Arc::new(ConflictingStore::new(memory.clone(), 2));
    let writer = IndexWriter::new(store, &IndexConfig::default());

    writer.write_one(&park(1)).await.unwrap();
    assert!(memory.get("sys1").await.unwrap().is_some());
    assert_eq!(memory.stats().commits, 1);
}

/// A batch that never commits leaves no trace of any record.
#[tokio::test]
async fn test_exhausted_retries_write_nothing() {
    let memory = MemoryStore::new();
    let store = Arc::new(ConflictingStore::new(memory.clone(), u32::MAX));
    let config = IndexConfig {
        max_retries: 4,
        ..Default::default()
    };
    let writer = IndexWriter::new(store, &config);

    let err = writer.write(&[park(1), park(2)]).await.unwrap_err();
    assert_eq!(err, IndexError::WriteConflict { attempts: 4 });
    assert!(err.is_conflict());
    assert!(memory.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_writers_all_succeed() {
    let store = MemoryStore::new();
    let writer = IndexWriter::new(Arc::new(store.clone()), &IndexConfig::default());

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let writer = writer.clone();
            let record = Record::new(format!("sys{}", n), n, n, n, format!("m{}", n), format!("me{}", n));
            tokio::spawn(async move { writer.write_one(&record).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(store.stats().conflicts, 0);
    assert_eq!(store.stats().commits, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_writers_serialize() {
    let store = MemoryStore::new();
    let config = IndexConfig {
        max_retries: 64,
        ..Default::default()
    };
    let writer = IndexWriter::new(Arc::new(store.clone()), &config);

    let handles: Vec<_> = (0..10)
        .map(|n| {
            let writer = writer.clone();
            tokio::spawn(async move { writer.write_one(&park(n)).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(store.llen("mode:park").await.unwrap(), 10);
    assert_eq!(store.llen("mode_en:parking").await.unwrap(), 10);
}

#[tokio::test]
async fn test_read_deadline() {
    let memory = MemoryStore::new();
    IndexWriter::new(Arc::new(memory.clone()), &IndexConfig::default())
        .write_one(&park(1))
        .await
        .unwrap();

    let store = Arc::new(SlowStore {
        inner: memory,
        delay: Duration::from_millis(200),
    });
    let reader = IndexReader::new(store, &IndexConfig::default());

    let err = reader
        .read_within("sys1", false, 5, 0, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(err.source.is_timeout());
}

#[tokio::test]
async fn test_write_deadline() {
    let memory = MemoryStore::new();
    let store = Arc::new(SlowStore {
        inner: memory.clone(),
        delay: Duration::from_millis(200),
    });
    let writer = IndexWriter::new(store, &IndexConfig::default());

    let err = writer
        .write_within(&[park(1)], Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err, IndexError::Timeout(Duration::from_millis(20)));
    assert!(memory.is_empty());
}
