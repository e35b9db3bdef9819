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

//! Write capability handed to ingestion adapters.

use async_trait::async_trait;
use parkindex_core::{Record, Result};

use crate::writer::IndexWriter;

/// Anything that can persist a batch of records.
///
/// Adapters only ever see this trait, never the store or the writer.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn save(&self, records: &[Record]) -> Result<()>;
}

#[async_trait]
impl RecordSink for IndexWriter {
    async fn save(&self, records: &[Record]) -> Result<()> {
        self.write(records).await
    }
}
