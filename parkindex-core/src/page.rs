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

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// One page of lookup results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Decoded records, in index order.
    pub data: Vec<Record>,
    /// Total number of entries behind the key, not the length of `data`.
    pub size: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(data: Vec<Record>, size: i64, offset: i64) -> Self {
        Self { data, size, offset }
    }

    /// No records, with the given total.
    pub fn empty(size: i64, offset: i64) -> Self {
        Self {
            data: Vec::new(),
            size,
            offset,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
