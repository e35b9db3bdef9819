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

//! Parkindex Core
//!
//! Fundamental data structures shared by the index writer, the read path and
//! the ingestion adapters:
//!
//! - [`Record`]: the indexed entity and its JSON codec
//! - [`IndexKey`]: construction of primary, point and membership keys
//! - [`SearchQuery`]: classification of a lookup into one index key
//! - [`Page`]: a bounded page of records plus the total count
//! - [`IndexError`] / [`ReadError`]: the error taxonomy

pub mod config;
pub mod error;
pub mod key;
pub mod page;
pub mod record;

pub use config::{
    IndexConfig, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_PAGE_SIZE,
};
pub use error::{IndexError, ReadError, Result};
pub use key::{is_point_redirect, DerivedKeys, IndexKey, IndexKind, SearchQuery, KEY_DELIMITER};
pub use page::Page;
pub use record::{decode_record, encode_record, Record};
