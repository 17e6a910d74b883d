//! Opaque records and the entity tables that hold them.

use crate::TypesError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity table a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Posts,
    Categories,
}

impl Table {
    /// Table name shared by the local store and the hosted backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Posts => "posts",
            Table::Categories => "categories",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(Table::Posts),
            "categories" => Ok(Table::Categories),
            other => Err(TypesError::UnknownTable(other.to_string())),
        }
    }
}

/// An application payload keyed by a unique identifier.
///
/// The store never validates `data`; it only extracts the few fields its
/// secondary indexes need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub data: serde_json::Value,
}

impl Record {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Builds a record from a JSON object carrying its own `id` field.
    pub fn from_json(data: serde_json::Value) -> Result<Self, TypesError> {
        let id = data
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or(TypesError::MissingId)?
            .to_string();
        Ok(Self { id, data })
    }

    /// Builds a record from a typed entity.
    pub fn from_typed<T: TableRecord>(value: &T) -> Result<Self, TypesError> {
        Ok(Self {
            id: value.record_id().to_string(),
            data: serde_json::to_value(value)?,
        })
    }

    /// Deserializes the payload into a typed entity.
    pub fn to_typed<T: TableRecord>(&self) -> Result<T, TypesError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Reads a string field by JSON pointer (e.g. `/category_id`).
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(|v| v.as_str())
    }
}

/// A typed entity stored in one of the entity tables.
pub trait TableRecord: Serialize + DeserializeOwned {
    const TABLE: Table;

    fn record_id(&self) -> &str;
}
