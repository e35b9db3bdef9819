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

//! Error taxonomy for the index engine.
//!
//! Errors are `Clone` because a single coalesced read fans the same error out
//! to every caller that joined it.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Key absent in the backing store. Read paths turn this into an empty
    /// page; it only escapes as an error from lower-level helpers.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The optimistic transaction could not commit within the retry budget.
    #[error("Write conflict: transaction aborted after {attempts} attempts")]
    WriteConflict { attempts: u32 },

    #[error("Failed to decode record at {key}: {message}")]
    Decode { key: String, message: String },

    #[error("Failed to encode record {key}: {message}")]
    Encode { key: String, message: String },

    /// Transport or protocol failure reported by the backing store.
    #[error("Backing store error: {0}")]
    Store(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl IndexError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, IndexError::WriteConflict { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, IndexError::Timeout(_))
    }
}

/// A failed read, together with the total the reader had already determined.
///
/// Range reads learn the membership size before fetching any record, so an
/// aborted page still reports the true total.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source}")]
pub struct ReadError {
    pub total: i64,
    pub source: IndexError,
}

impl ReadError {
    pub fn new(total: i64, source: IndexError) -> Self {
        Self { total, source }
    }
}

impl From<IndexError> for ReadError {
    fn from(source: IndexError) -> Self {
        Self { total: 0, source }
    }
}
