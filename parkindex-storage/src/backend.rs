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

//! Backing store abstraction.
//!
//! The index engine only needs a narrow slice of a key-value store:
//!
//! - `GET` / `SET` for primary blobs and point indices
//! - `RPUSH` / `LLEN` / `LRANGE` for membership lists
//! - `WATCH` + queued transaction + `EXEC` for optimistic multi-key writes
//!
//! A store reports a failed `EXEC` as [`StoreError::Conflict`], kept distinct
//! from transport failures so the writer can retry only contention.

use async_trait::async_trait;
use parkindex_core::IndexError;
use std::time::Duration;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A watched key changed between `WATCH` and `EXEC`.
    #[error("Transaction aborted: watched key modified")]
    Conflict,

    /// Operation against a key holding the wrong kind of value.
    #[error("WRONGTYPE operation against key {0}")]
    WrongType(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for IndexError {
    fn from(err: StoreError) -> Self {
        IndexError::Store(err.to_string())
    }
}

/// A write queued inside a watch transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    Set { key: String, value: Vec<u8> },
    RPush { key: String, value: Vec<u8> },
}

impl TxOp {
    pub fn set(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        TxOp::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn rpush(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        TxOp::RPush {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            TxOp::Set { key, .. } | TxOp::RPush { key, .. } => key,
        }
    }
}

/// An open optimistic transaction.
///
/// Reads go through the transaction so they happen after the watch is
/// registered; `exec` applies all queued operations atomically or fails with
/// [`StoreError::Conflict`] without applying any.
#[async_trait]
pub trait WatchTxn: Send {
    async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn exec(self: Box<Self>, ops: Vec<TxOp>) -> StoreResult<()>;
}

#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Value of a string key, `None` when absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Set a string key, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()>;

    /// Append to a list, returning the new length.
    async fn rpush(&self, key: &str, value: &[u8]) -> StoreResult<i64>;

    /// List length, zero when absent.
    async fn llen(&self, key: &str) -> StoreResult<i64>;

    /// Elements `start..=stop` of a list; negative indices count from the end.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>>;

    /// Begin a transaction watching `keys`.
    async fn watch(&self, keys: &[String]) -> StoreResult<Box<dyn WatchTxn>>;
}
