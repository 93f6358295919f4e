//! Record identity and lookup keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

use crate::filter::FilterValue;

/// A hashable key identifying a parent record or grouping lookup rows.
///
/// Keys are what result maps are indexed by, so unlike [`FilterValue`] they
/// are restricted to types with total equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    /// Integer key.
    Int(i64),
    /// UUID key.
    Uuid(Uuid),
    /// Text key.
    Text(SmolStr),
}

impl RecordKey {
    /// Convert a column value into a key.
    ///
    /// Returns `None` for nulls and for values with no total equality.
    pub fn from_value(value: &FilterValue) -> Option<Self> {
        match value {
            FilterValue::Int(v) => Some(Self::Int(*v)),
            FilterValue::Uuid(v) => Some(Self::Uuid(*v)),
            FilterValue::String(s) => Some(Self::Text(SmolStr::new(s))),
            _ => None,
        }
    }

    /// Convert the key into a bindable filter value.
    pub fn to_value(&self) -> FilterValue {
        match self {
            Self::Int(v) => FilterValue::Int(*v),
            Self::Uuid(v) => FilterValue::Uuid(*v),
            Self::Text(s) => FilterValue::String(s.to_string()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Uuid(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for RecordKey {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<Uuid> for RecordKey {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<&str> for RecordKey {
    fn from(v: &str) -> Self {
        Self::Text(SmolStr::new(v))
    }
}

impl From<String> for RecordKey {
    fn from(v: String) -> Self {
        Self::Text(SmolStr::from(v))
    }
}

impl From<RecordKey> for FilterValue {
    fn from(key: RecordKey) -> Self {
        key.to_value()
    }
}
