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

//! In-process backing store with Redis-like semantics.
//!
//! Every key carries a version that is bumped on each mutation. `watch`
//! snapshots the versions of the watched keys and `exec` commits only if none
//! of them moved, which is the optimistic contract the index writer relies on.
//!
//! All state lives behind one mutex; no lock is held across an `.await`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{BackingStore, StoreError, StoreResult, TxOp, WatchTxn};

#[derive(Debug, Clone)]
enum Value {
    Str(Vec<u8>),
    List(Vec<Vec<u8>>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    versions: HashMap<String, u64>,
    next_version: u64,
}

impl Keyspace {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        self.next_version += 1;
        self.versions.insert(key.to_string(), self.next_version);
    }

    fn live(&mut self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        if self.entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
            self.entries.remove(key);
        }
        self.entries.get(key)
    }

    fn get_str(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn list(&mut self, key: &str) -> StoreResult<Option<&Vec<Vec<u8>>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(Some(items)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn set(&mut self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let entry = Entry {
            value: Value::Str(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        self.touch(key);
    }

    fn rpush(&mut self, key: &str, value: Vec<u8>) -> StoreResult<i64> {
        // Validates the type and drops an expired value first.
        self.list(key)?;
        let entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: Value::List(Vec::new()),
            expires_at: None,
        });
        let len = match &mut entry.value {
            Value::List(items) => {
                items.push(value);
                items.len() as i64
            }
            Value::Str(_) => return Err(StoreError::WrongType(key.to_string())),
        };
        self.touch(key);
        Ok(len)
    }
}

/// Counters for every operation served by a [`MemoryStore`].
#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    sets: AtomicU64,
    pushes: AtomicU64,
    range_reads: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

/// Snapshot of [`MemoryStore`] operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// `GET` calls, including reads inside transactions
    pub gets: u64,
    pub sets: u64,
    pub pushes: u64,
    /// `LLEN` and `LRANGE` calls
    pub range_reads: u64,
    /// Successful `EXEC`s
    pub commits: u64,
    /// `EXEC`s aborted by a watched key
    pub conflicts: u64,
}

/// Shared, cloneable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keyspace: Arc<Mutex<Keyspace>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MemoryStoreStats {
        let c = &self.counters;
        MemoryStoreStats {
            gets: c.gets.load(Ordering::Relaxed),
            sets: c.sets.load(Ordering::Relaxed),
            pushes: c.pushes.load(Ordering::Relaxed),
            range_reads: c.range_reads.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            conflicts: c.conflicts.load(Ordering::Relaxed),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.keyspace
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        self.keyspace.lock().get_str(key)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.keyspace.lock().set(key, value.to_vec(), ttl);
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> StoreResult<i64> {
        self.counters.pushes.fetch_add(1, Ordering::Relaxed);
        self.keyspace.lock().rpush(key, value.to_vec())
    }

    async fn llen(&self, key: &str) -> StoreResult<i64> {
        self.counters.range_reads.fetch_add(1, Ordering::Relaxed);
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.list(key)?.map(|items| items.len() as i64).unwrap_or(0))
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>> {
        self.counters.range_reads.fetch_add(1, Ordering::Relaxed);
        let mut keyspace = self.keyspace.lock();
        let items = match keyspace.list(key)? {
            Some(items) => items,
            None => return Ok(Vec::new()),
        };
        Ok(match range_bounds(items.len() as i64, start, stop) {
            Some((from, to)) => items[from..=to].to_vec(),
            None => Vec::new(),
        })
    }

    async fn watch(&self, keys: &[String]) -> StoreResult<Box<dyn WatchTxn>> {
        let keyspace = self.keyspace.lock();
        let watched = keys
            .iter()
            .map(|key| (key.clone(), keyspace.version(key)))
            .collect();
        Ok(Box::new(MemoryTxn {
            store: self.clone(),
            watched,
        }))
    }
}

/// Resolve Redis `LRANGE` bounds against a list of `len` elements.
fn range_bounds(len: i64, start: i64, stop: i64) -> Option<(usize, usize)> {
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

struct MemoryTxn {
    store: MemoryStore,
    watched: Vec<(String, u64)>,
}

#[async_trait]
impl WatchTxn for MemoryTxn {
    async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.store.get(key).await
    }

    async fn exec(self: Box<Self>, ops: Vec<TxOp>) -> StoreResult<()> {
        let counters = &self.store.counters;
        let mut keyspace = self.store.keyspace.lock();

        let changed = self
            .watched
            .iter()
            .any(|(key, version)| keyspace.version(key) != *version);
        if changed {
            counters.conflicts.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Conflict);
        }

        // Type errors must reject the whole transaction before anything is
        // applied, including ones caused by an earlier op in the same batch.
        let mut staged: HashMap<&str, bool> = HashMap::new();
        for op in &ops {
            match op {
                TxOp::Set { key, .. } => {
                    staged.insert(key.as_str(), false);
                }
                TxOp::RPush { key, .. } => match staged.get(key.as_str()) {
                    Some(true) => {}
                    Some(false) => return Err(StoreError::WrongType(key.clone())),
                    None => {
                        keyspace.list(key)?;
                        staged.insert(key.as_str(), true);
                    }
                },
            }
        }

        for op in ops {
            match op {
                TxOp::Set { key, value } => {
                    counters.sets.fetch_add(1, Ordering::Relaxed);
                    keyspace.set(&key, value, None);
                }
                TxOp::RPush { key, value } => {
                    counters.pushes.fetch_add(1, Ordering::Relaxed);
                    keyspace.rpush(&key, value)?;
                }
            }
        }
        counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("sys1").await.unwrap(), None);

        store.set("sys1", b"blob", None).await.unwrap();
        assert_eq!(store.get("sys1").await.unwrap(), Some(b"blob".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_set_with_ttl_expires() {
        let store = MemoryStore::new();
        store
            .set("session", b"x", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.get("session").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("session").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_ops() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c", "d"] {
            store.rpush("mode:park", id.as_bytes()).await.unwrap();
        }
        assert_eq!(store.llen("mode:park").await.unwrap(), 4);
        assert_eq!(store.llen("mode:none").await.unwrap(), 0);

        let slice = store.lrange("mode:park", 1, 2).await.unwrap();
        assert_eq!(slice, vec![b"b".to_vec(), b"c".to_vec()]);

        let all = store.lrange("mode:park", 0, -1).await.unwrap();
        assert_eq!(all.len(), 4);

        // Stop past the end is clamped, start past the end is empty.
        assert_eq!(store.lrange("mode:park", 2, 100).await.unwrap().len(), 2);
        assert!(store.lrange("mode:park", 4, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.rpush("mode:park", b"a").await.unwrap();
        assert_eq!(
            store.get("mode:park").await.unwrap_err(),
            StoreError::WrongType("mode:park".into())
        );

        store.set("sys1", b"blob", None).await.unwrap();
        assert!(store.rpush("sys1", b"a").await.is_err());
    }

    #[tokio::test]
    async fn test_exec_applies_all_ops() {
        let store = MemoryStore::new();
        let txn = store.watch(&["sys1".to_string()]).await.unwrap();
        txn.exec(vec![
            TxOp::set("sys1", b"blob".to_vec()),
            TxOp::rpush("mode:park", "sys1"),
        ])
        .await
        .unwrap();

        assert_eq!(store.get("sys1").await.unwrap(), Some(b"blob".to_vec()));
        assert_eq!(store.llen("mode:park").await.unwrap(), 1);
        assert_eq!(store.stats().commits, 1);
    }

    #[tokio::test]
    async fn test_exec_conflicts_when_watched_key_changes() {
        let store = MemoryStore::new();
        let keys = vec!["sys1".to_string(), "mode:park".to_string()];
        let mut txn = store.watch(&keys).await.unwrap();
        assert_eq!(txn.get("sys1").await.unwrap(), None);

        // Another writer touches a watched key.
        store.rpush("mode:park", b"other").await.unwrap();

        let err = txn
            .exec(vec![TxOp::set("sys1", b"blob".to_vec())])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict);
        assert_eq!(store.get("sys1").await.unwrap(), None);
        assert_eq!(store.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn test_exec_unwatched_change_does_not_conflict() {
        let store = MemoryStore::new();
        let txn = store.watch(&["sys1".to_string()]).await.unwrap();
        store.set("sys2", b"other", None).await.unwrap();

        txn.exec(vec![TxOp::set("sys1", b"blob".to_vec())])
            .await
            .unwrap();
        assert!(store.get("sys1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exec_wrong_type_applies_nothing() {
        let store = MemoryStore::new();
        store.set("mode:park", b"not a list", None).await.unwrap();

        let txn = store.watch(&[]).await.unwrap();
        let err = txn
            .exec(vec![
                TxOp::set("sys1", b"blob".to_vec()),
                TxOp::rpush("mode:park", "sys1"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongType(_)));
        assert_eq!(store.get("sys1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_exec_wrong_type_from_earlier_op_applies_nothing() {
        let store = MemoryStore::new();
        let txn = store.watch(&[]).await.unwrap();
        let err = txn
            .exec(vec![
                TxOp::set("sys1", b"blob".to_vec()),
                TxOp::set("mode:park", b"blob".to_vec()),
                TxOp::rpush("mode:park", "sys1"),
            ])
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::WrongType("mode:park".into()));
        assert_eq!(store.get("sys1").await.unwrap(), None);
        assert_eq!(store.get("mode:park").await.unwrap(), None);
        assert_eq!(store.stats().commits, 0);
    }

    #[tokio::test]
    async fn test_exec_push_then_set_same_key_commits() {
        let store = MemoryStore::new();
        let txn = store.watch(&[]).await.unwrap();
        txn.exec(vec![
            TxOp::rpush("mode:park", "sys1"),
            TxOp::set("mode:park", b"blob".to_vec()),
        ])
        .await
        .unwrap();
        assert_eq!(store.get("mode:park").await.unwrap(), Some(b"blob".to_vec()));
    }

    #[test]
    fn test_range_bounds() {
        assert_eq!(range_bounds(5, 0, 5), Some((0, 4)));
        assert_eq!(range_bounds(5, -2, -1), Some((3, 4)));
        assert_eq!(range_bounds(5, 5, 10), None);
        assert_eq!(range_bounds(0, 0, 0), None);
        assert_eq!(range_bounds(5, 3, 1), None);
    }
}
