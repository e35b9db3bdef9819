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

//! Parkindex Storage Layer
//!
//! Transactional index maintenance over a pluggable key-value store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   write(records)   ┌──────────────┐
//! │ RecordSink   │ ─────────────────▶ │ IndexWriter  │──┐ WATCH / MULTI / EXEC
//! └──────────────┘                    └──────────────┘  │
//!                                                       ▼
//!                                              ┌────────────────┐
//!                                              │ BackingStore   │ (MemoryStore, ...)
//!                                              └────────────────┘
//!                                                       ▲
//! ┌──────────────┐  read(key, multiple, size, offset)   │ GET / LLEN / LRANGE
//! │ IndexReader  │ ─────────────────────────────────────┘
//! └──────────────┘
//! ```

pub mod backend;
pub mod memory;
pub mod reader;
pub mod sink;
pub mod writer;

pub use backend::{BackingStore, StoreError, StoreResult, TxOp, WatchTxn};
pub use memory::{MemoryStore, MemoryStoreStats};
pub use reader::IndexReader;
pub use sink::RecordSink;
pub use writer::IndexWriter;
