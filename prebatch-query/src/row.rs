//! Rows returned by lookup queries.
//!
//! A [`Record`] is an ordered column → value map. Lookup results are stored
//! on parents as records so that a single parent can carry rows from any
//! number of unrelated tables; [`FromRecord`] turns them back into caller
//! types on access.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::filter::FilterValue;

/// Error type for record conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum RowError {
    /// Column not found.
    ColumnNotFound(String),
    /// Type conversion error.
    TypeConversion {
        /// The column being read.
        column: String,
        /// What went wrong.
        message: String,
    },
    /// Null value in non-nullable column.
    UnexpectedNull(String),
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnNotFound(col) => write!(f, "column '{}' not found", col),
            Self::TypeConversion { column, message } => {
                write!(f, "type conversion error for '{}': {}", column, message)
            }
            Self::UnexpectedNull(col) => write!(f, "unexpected null in column '{}'", col),
        }
    }
}

impl std::error::Error for RowError {}

/// A row of column values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    columns: IndexMap<SmolStr, FilterValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, builder style.
    pub fn with(mut self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column value.
    pub fn set(&mut self, column: &str, value: impl Into<FilterValue>) {
        self.columns.insert(SmolStr::new(column), value.into());
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&FilterValue> {
        self.columns.get(column)
    }

    /// Get a required column value.
    pub fn try_get(&self, column: &str) -> Result<&FilterValue, RowError> {
        self.get(column)
            .ok_or_else(|| RowError::ColumnNotFound(column.to_string()))
    }

    /// Get a required integer column.
    pub fn get_i64(&self, column: &str) -> Result<i64, RowError> {
        match self.try_get(column)? {
            FilterValue::Int(v) => Ok(*v),
            FilterValue::Null => Err(RowError::UnexpectedNull(column.to_string())),
            other => Err(RowError::TypeConversion {
                column: column.to_string(),
                message: format!("expected integer, found {:?}", other),
            }),
        }
    }

    /// Get a required string column.
    pub fn get_str(&self, column: &str) -> Result<&str, RowError> {
        match self.try_get(column)? {
            FilterValue::String(s) => Ok(s),
            FilterValue::Null => Err(RowError::UnexpectedNull(column.to_string())),
            other => Err(RowError::TypeConversion {
                column: column.to_string(),
                message: format!("expected string, found {:?}", other),
            }),
        }
    }

    /// Iterate over columns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<FilterValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(k, v)| (SmolStr::new(k.as_ref()), v.into()))
                .collect(),
        }
    }
}

/// Conversion from a [`Record`] into a caller type.
pub trait FromRecord: Sized {
    /// Build `Self` from a record.
    fn from_record(record: &Record) -> Result<Self, RowError>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> Result<Self, RowError> {
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let record = Record::new().with("id", 4).with("name", "Ada").with("bio", FilterValue::Null);
        assert_eq!(record.get_i64("id"), Ok(4));
        assert_eq!(record.get_str("name"), Ok("Ada"));
        assert_eq!(record.get_str("bio"), Err(RowError::UnexpectedNull("bio".into())));
        assert!(matches!(record.get_i64("name"), Err(RowError::TypeConversion { .. })));
        assert_eq!(record.get_i64("nope"), Err(RowError::ColumnNotFound("nope".into())));
    }

    #[test]
    fn test_from_iter_keeps_order() {
        let record: Record = [("b", 1), ("a", 2)].into_iter().collect();
        let cols: Vec<_> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(cols, vec!["b", "a"]);
    }
}
