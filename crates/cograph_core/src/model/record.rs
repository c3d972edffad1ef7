//! Edit records persisted by the undo/redo stack store.
//!
//! # Responsibility
//! - Carry one serialized, reversible user action as an opaque blob.
//! - Provide the reference marker shape shared with object property lists.
//!
//! # Invariants
//! - The stack store never parses record text; malformed records surface only
//!   when a consumer calls `EditRecord::decode`.

use crate::model::value::ObjectId;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Key holding the referenced identity in a reference marker.
pub const REFERENCE_KEY: &str = "$ref";
/// Key holding the referenced entity name in a reference marker.
pub const ENTITY_KEY: &str = "$entity";

/// Structured record decode errors.
#[derive(Debug)]
pub enum RecordError {
    /// Record text is not valid JSON.
    Json(serde_json::Error),
    /// Record is valid JSON but not a top-level map.
    NotAMap,
    /// A `$ref` marker is present but incomplete or malformed.
    InvalidReference(String),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "malformed edit record: {err}"),
            Self::NotAMap => write!(f, "edit record must be a map"),
            Self::InvalidReference(message) => write!(f, "invalid reference marker: {message}"),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::NotAMap | Self::InvalidReference(_) => None,
        }
    }
}

impl From<serde_json::Error> for RecordError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Opaque serialized description of one reversible action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRecord {
    data: String,
}

impl EditRecord {
    /// Encodes a structured map.
    pub fn from_map(map: &Map<String, JsonValue>) -> Self {
        Self {
            data: JsonValue::Object(map.clone()).to_string(),
        }
    }

    /// Encodes a JSON value that must be a top-level map.
    pub fn from_value(value: JsonValue) -> Result<Self, RecordError> {
        match value {
            JsonValue::Object(map) => Ok(Self::from_map(&map)),
            _ => Err(RecordError::NotAMap),
        }
    }

    /// Wraps already-serialized text without inspecting it.
    pub fn from_raw(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_str(&self) -> &str {
        self.data.as_str()
    }

    pub fn into_inner(self) -> String {
        self.data
    }

    /// Decodes the record into its structured map.
    pub fn decode(&self) -> Result<Map<String, JsonValue>, RecordError> {
        match serde_json::from_str::<JsonValue>(self.data.as_str())? {
            JsonValue::Object(map) => Ok(map),
            _ => Err(RecordError::NotAMap),
        }
    }

    /// Decodes the record into a caller-defined edit type.
    pub fn decode_as<T: DeserializeOwned>(&self) -> Result<T, RecordError> {
        Ok(serde_json::from_str(self.data.as_str())?)
    }
}

/// Builds a reference marker pointing at one persistent object.
pub fn reference_marker(id: ObjectId, entity: &str) -> JsonValue {
    let mut marker = Map::new();
    marker.insert(REFERENCE_KEY.to_string(), JsonValue::String(id.to_string()));
    marker.insert(ENTITY_KEY.to_string(), JsonValue::String(entity.to_string()));
    JsonValue::Object(marker)
}

/// Reads a reference marker.
///
/// Returns `Ok(None)` when the map carries no `$ref` key.
pub fn parse_reference_marker(
    map: &Map<String, JsonValue>,
) -> Result<Option<(ObjectId, String)>, RecordError> {
    let Some(reference) = map.get(REFERENCE_KEY) else {
        return Ok(None);
    };
    let id_text = reference
        .as_str()
        .ok_or_else(|| RecordError::InvalidReference(format!("`{REFERENCE_KEY}` must be text")))?;
    let id = Uuid::parse_str(id_text)
        .map_err(|_| RecordError::InvalidReference(format!("invalid uuid `{id_text}`")))?;
    let entity = map
        .get(ENTITY_KEY)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| RecordError::InvalidReference(format!("missing `{ENTITY_KEY}`")))?;
    Ok(Some((id, entity.to_string())))
}
