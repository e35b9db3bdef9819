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

//! Record entity and its JSON codec.
//!
//! Field names follow the open-data feed the records are loaded from. Every
//! field that is not one of the indexed attributes lands in `payload` and is
//! written back untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::IndexError;
use crate::key::{DerivedKeys, IndexKey};

/// A single indexed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique, caller-assigned identifier; the primary blob key.
    #[serde(rename = "system_object_id")]
    pub system_object_id: String,

    #[serde(rename = "global_id")]
    pub global_id: i64,

    #[serde(rename = "ID")]
    pub id: i64,

    #[serde(rename = "ID_en")]
    pub id_en: i64,

    #[serde(rename = "Mode")]
    pub mode: String,

    #[serde(rename = "Mode_en")]
    pub mode_en: String,

    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    pub fn new(
        system_object_id: impl Into<String>,
        global_id: i64,
        id: i64,
        id_en: i64,
        mode: impl Into<String>,
        mode_en: impl Into<String>,
    ) -> Self {
        Self {
            system_object_id: system_object_id.into(),
            global_id,
            id,
            id_en,
            mode: mode.into(),
            mode_en: mode_en.into(),
            payload: Map::new(),
        }
    }

    /// Attach an opaque payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.payload.insert(name.into(), value);
        self
    }

    /// The primary key plus the five derived index keys of this record.
    pub fn derived_keys(&self) -> DerivedKeys {
        DerivedKeys {
            primary: IndexKey::Primary(self.system_object_id.clone()).to_string(),
            global_id: IndexKey::GlobalId(self.global_id).to_string(),
            id: IndexKey::Id(self.id).to_string(),
            id_en: IndexKey::IdEn(self.id_en).to_string(),
            mode: IndexKey::Mode(self.mode.clone()).to_string(),
            mode_en: IndexKey::ModeEn(self.mode_en.clone()).to_string(),
        }
    }
}

/// Serialize a record into the blob stored under its primary key.
pub fn encode_record(record: &Record) -> Result<Vec<u8>, IndexError> {
    serde_json::to_vec(record).map_err(|e| IndexError::Encode {
        key: record.system_object_id.clone(),
        message: e.to_string(),
    })
}

/// Deserialize the blob stored at `key`.
pub fn decode_record(key: &str, bytes: &[u8]) -> Result<Record, IndexError> {
    serde_json::from_slice(bytes).map_err(|e| IndexError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })
}
