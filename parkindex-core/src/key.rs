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

//! Index key construction.
//!
//! # Key Encoding
//!
//! ```text
//! {system_object_id}          -> primary blob
//! global_id:{global_id}       -> system_object_id
//! id:{id}                     -> system_object_id
//! id_en:{id_en}               -> system_object_id
//! mode:{mode}                 -> [system_object_id, ...]
//! mode_en:{mode_en}           -> [system_object_id, ...]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IndexError;

/// Separates an index prefix from its value.
pub const KEY_DELIMITER: char = ':';

/// How a key is resolved by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Raw primary identifier; the value is the record blob.
    Primary,
    /// One alternate identifier mapped to exactly one primary identifier.
    Point,
    /// Ordered, non-deduplicated list of primary identifiers.
    Membership,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Primary(String),
    GlobalId(i64),
    Id(i64),
    IdEn(i64),
    Mode(String),
    ModeEn(String),
}

impl IndexKey {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexKey::Primary(_) => IndexKind::Primary,
            IndexKey::GlobalId(_) | IndexKey::Id(_) | IndexKey::IdEn(_) => IndexKind::Point,
            IndexKey::Mode(_) | IndexKey::ModeEn(_) => IndexKind::Membership,
        }
    }

    /// Membership keys are read in range mode.
    pub fn is_membership(&self) -> bool {
        self.kind() == IndexKind::Membership
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Primary(id) => f.write_str(id),
            IndexKey::GlobalId(v) => write!(f, "global_id{}{}", KEY_DELIMITER, v),
            IndexKey::Id(v) => write!(f, "id{}{}", KEY_DELIMITER, v),
            IndexKey::IdEn(v) => write!(f, "id_en{}{}", KEY_DELIMITER, v),
            IndexKey::Mode(v) => write!(f, "mode{}{}", KEY_DELIMITER, v),
            IndexKey::ModeEn(v) => write!(f, "mode_en{}{}", KEY_DELIMITER, v),
        }
    }
}

/// Whether a point-mode search key names an index entry (one extra hop to the
/// primary identifier) rather than a primary identifier.
pub fn is_point_redirect(search_key: &str) -> bool {
    search_key.contains(KEY_DELIMITER)
}

/// The six keys one record occupies in the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    pub primary: String,
    pub global_id: String,
    pub id: String,
    pub id_en: String,
    pub mode: String,
    pub mode_en: String,
}

impl DerivedKeys {
    /// Point index keys, each set to the primary identifier.
    pub fn point_keys(&self) -> [&str; 3] {
        [self.global_id.as_str(), self.id.as_str(), self.id_en.as_str()]
    }

    /// Membership index keys, each appended with the primary identifier.
    pub fn membership_keys(&self) -> [&str; 2] {
        [self.mode.as_str(), self.mode_en.as_str()]
    }

    pub fn all(&self) -> [&str; 6] {
        [
            self.primary.as_str(),
            self.global_id.as_str(),
            self.id.as_str(),
            self.id_en.as_str(),
            self.mode.as_str(),
            self.mode_en.as_str(),
        ]
    }
}

/// A lookup request naming at most one identifier per field.
///
/// When several identifiers are present the first one in the order
/// `system_object_id`, `global_id`, `ID`, `ID_en`, `Mode`, `Mode_en` wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default, rename = "system_object_id")]
    pub system_object_id: Option<String>,
    #[serde(default, rename = "global_id")]
    pub global_id: Option<i64>,
    #[serde(default, rename = "ID")]
    pub id: Option<i64>,
    #[serde(default, rename = "ID_en")]
    pub id_en: Option<i64>,
    #[serde(default, rename = "Mode")]
    pub mode: Option<String>,
    #[serde(default, rename = "Mode_en")]
    pub mode_en: Option<String>,
    #[serde(default)]
    pub offset: i64,
}

impl SearchQuery {
    pub fn index_key(&self) -> Result<IndexKey, IndexError> {
        if let Some(id) = &self.system_object_id {
            return Ok(IndexKey::Primary(id.clone()));
        }
        if let Some(v) = self.global_id {
            return Ok(IndexKey::GlobalId(v));
        }
        if let Some(v) = self.id {
            return Ok(IndexKey::Id(v));
        }
        if let Some(v) = self.id_en {
            return Ok(IndexKey::IdEn(v));
        }
        if let Some(v) = &self.mode {
            return Ok(IndexKey::Mode(v.clone()));
        }
        if let Some(v) = &self.mode_en {
            return Ok(IndexKey::ModeEn(v.clone()));
        }
        Err(IndexError::InvalidQuery(
            "no searchable identifier supplied".to_string(),
        ))
    }
}
