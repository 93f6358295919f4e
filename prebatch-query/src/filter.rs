//! Filter values and WHERE-clause filters.
//!
//! [`FilterValue`] is the scalar currency between the batcher and an engine:
//! parent ids and lookup keys go out as filter values, aggregate results and
//! row columns come back as filter values. [`Filter`] describes the WHERE
//! clause of a grouped query and can be rendered to SQL or evaluated against
//! an in-memory [`Record`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::row::Record;
use crate::sql::{DatabaseType, quote_identifier};

/// A filter value that can be used in comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// UUID value.
    Uuid(Uuid),
    /// String value.
    String(String),
    /// JSON value.
    Json(serde_json::Value),
    /// List of values.
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a float, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Integers and floats compare numerically with each other. Values of
    /// unrelated types, nulls, and NaN are unordered.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Check two values for equality, numerically across int and float.
    pub fn loosely_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => false,
            _ => self.compare(other) == Some(Ordering::Equal) || self == other,
        }
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Uuid> for FilterValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// A complete filter that can be converted to SQL.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,

    /// Equals comparison.
    Equals(String, FilterValue),
    /// Not equals comparison.
    NotEquals(String, FilterValue),

    /// Less than comparison.
    Lt(String, FilterValue),
    /// Less than or equal comparison.
    Lte(String, FilterValue),
    /// Greater than comparison.
    Gt(String, FilterValue),
    /// Greater than or equal comparison.
    Gte(String, FilterValue),

    /// In a list of values.
    In(String, Vec<FilterValue>),
    /// Not in a list of values.
    NotIn(String, Vec<FilterValue>),

    /// Is null check.
    IsNull(String),
    /// Is not null check.
    IsNotNull(String),

    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn none() -> Self {
        Self::None
    }

    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Create an AND filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    pub fn not(filter: Filter) -> Self {
        if filter.is_none() {
            return Self::None;
        }
        Self::Not(Box::new(filter))
    }

    /// Combine with another filter using AND.
    pub fn and_then(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Generate SQL for this filter with parameter placeholders.
    ///
    /// `param_offset` is the number of parameters already bound before this
    /// filter. Returns `(sql, params)` where params are the values to bind.
    pub fn to_sql(&self, param_offset: usize, db: DatabaseType) -> (String, Vec<FilterValue>) {
        let mut params = Vec::new();
        let sql = self.write_sql(param_offset, db, &mut params);
        (sql, params)
    }

    fn write_sql(&self, offset: usize, db: DatabaseType, params: &mut Vec<FilterValue>) -> String {
        let bind = |val: &FilterValue, params: &mut Vec<FilterValue>| {
            params.push(val.clone());
            db.placeholder(offset + params.len())
        };

        match self {
            Self::None => "TRUE".to_string(),

            Self::Equals(col, val) if val.is_null() => {
                format!("{} IS NULL", quote_identifier(col))
            }
            Self::NotEquals(col, val) if val.is_null() => {
                format!("{} IS NOT NULL", quote_identifier(col))
            }
            Self::Equals(col, val) => {
                format!("{} = {}", quote_identifier(col), bind(val, params))
            }
            Self::NotEquals(col, val) => {
                format!("{} != {}", quote_identifier(col), bind(val, params))
            }
            Self::Lt(col, val) => format!("{} < {}", quote_identifier(col), bind(val, params)),
            Self::Lte(col, val) => format!("{} <= {}", quote_identifier(col), bind(val, params)),
            Self::Gt(col, val) => format!("{} > {}", quote_identifier(col), bind(val, params)),
            Self::Gte(col, val) => format!("{} >= {}", quote_identifier(col), bind(val, params)),

            Self::In(_, values) if values.is_empty() => "FALSE".to_string(),
            Self::NotIn(_, values) if values.is_empty() => "TRUE".to_string(),
            Self::In(col, values) => {
                let placeholders: Vec<_> = values.iter().map(|v| bind(v, params)).collect();
                format!("{} IN ({})", quote_identifier(col), placeholders.join(", "))
            }
            Self::NotIn(col, values) => {
                let placeholders: Vec<_> = values.iter().map(|v| bind(v, params)).collect();
                format!("{} NOT IN ({})", quote_identifier(col), placeholders.join(", "))
            }

            Self::IsNull(col) => format!("{} IS NULL", quote_identifier(col)),
            Self::IsNotNull(col) => format!("{} IS NOT NULL", quote_identifier(col)),

            Self::And(filters) | Self::Or(filters) if filters.is_empty() => {
                let empty = if matches!(self, Self::And(_)) { "TRUE" } else { "FALSE" };
                empty.to_string()
            }
            Self::And(filters) => {
                let parts: Vec<_> = filters
                    .iter()
                    .map(|f| f.write_sql(offset, db, params))
                    .collect();
                format!("({})", parts.join(" AND "))
            }
            Self::Or(filters) => {
                let parts: Vec<_> = filters
                    .iter()
                    .map(|f| f.write_sql(offset, db, params))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            Self::Not(filter) => format!("NOT ({})", filter.write_sql(offset, db, params)),
        }
    }

    /// Evaluate this filter against a record.
    ///
    /// Follows SQL semantics for nulls: comparisons against a missing or
    /// null column never match.
    pub fn matches(&self, record: &Record) -> bool {
        let cmp = |col: &str, val: &FilterValue| -> Option<Ordering> {
            record.get(col).and_then(|actual| actual.compare(val))
        };

        match self {
            Self::None => true,
            Self::Equals(col, val) if val.is_null() => Self::IsNull(col.clone()).matches(record),
            Self::NotEquals(col, val) if val.is_null() => {
                Self::IsNotNull(col.clone()).matches(record)
            }
            Self::Equals(col, val) => record
                .get(col)
                .is_some_and(|actual| actual.loosely_equals(val)),
            Self::NotEquals(col, val) => record
                .get(col)
                .is_some_and(|actual| !actual.is_null() && !actual.loosely_equals(val)),
            Self::Lt(col, val) => cmp(col, val) == Some(Ordering::Less),
            Self::Lte(col, val) => matches!(cmp(col, val), Some(Ordering::Less | Ordering::Equal)),
            Self::Gt(col, val) => cmp(col, val) == Some(Ordering::Greater),
            Self::Gte(col, val) => {
                matches!(cmp(col, val), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::In(col, values) => record
                .get(col)
                .is_some_and(|actual| values.iter().any(|v| actual.loosely_equals(v))),
            Self::NotIn(col, values) => record.get(col).is_some_and(|actual| {
                !actual.is_null() && !values.iter().any(|v| actual.loosely_equals(v))
            }),
            Self::IsNull(col) => record.get(col).is_none_or(FilterValue::is_null),
            Self::IsNotNull(col) => record.get(col).is_some_and(|v| !v.is_null()),
            Self::And(filters) => filters.iter().all(|f| f.matches(record)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Self::Not(filter) => !filter.matches(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new()
            .with("id", 7)
            .with("score", 4.5)
            .with("status", "published")
            .with("deleted_at", FilterValue::Null)
    }

    #[test]
    fn test_filter_value_from() {
        assert_eq!(FilterValue::from(42i32), FilterValue::Int(42));
        assert_eq!(FilterValue::from("hello"), FilterValue::String("hello".to_string()));
        assert_eq!(FilterValue::from(None::<i64>), FilterValue::Null);
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(
            FilterValue::Int(2).compare(&FilterValue::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(FilterValue::Int(1).compare(&FilterValue::from("1")), None);
        assert!(FilterValue::Int(3).loosely_equals(&FilterValue::Float(3.0)));
        assert!(!FilterValue::Null.loosely_equals(&FilterValue::Null));
    }

    #[test]
    fn test_in_sql_postgres() {
        let filter = Filter::In("post_id".to_string(), vec![1.into(), 2.into(), 3.into()]);
        let (sql, params) = filter.to_sql(0, DatabaseType::PostgreSQL);
        assert_eq!(sql, "post_id IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_and_sql_numbers_params_sequentially() {
        let filter = Filter::and([
            Filter::In("user_id".to_string(), vec![1.into(), 2.into()]),
            Filter::Equals("status".to_string(), "published".into()),
        ]);
        let (sql, params) = filter.to_sql(0, DatabaseType::PostgreSQL);
        assert_eq!(sql, "(user_id IN ($1, $2) AND status = $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_reserved_columns_are_quoted() {
        let filter = Filter::and([
            Filter::In("user".to_string(), vec![1.into()]),
            Filter::IsNull("group".to_string()),
            Filter::Equals("order".to_string(), FilterValue::Null),
        ]);
        let (sql, _) = filter.to_sql(0, DatabaseType::MySQL);
        assert_eq!(sql, r#"("user" IN (?) AND "group" IS NULL AND "order" IS NULL)"#);
    }

    #[test]
    fn test_sql_with_offset_and_mysql() {
        let filter = Filter::Gt("score".to_string(), FilterValue::Int(3));
        assert_eq!(filter.to_sql(2, DatabaseType::PostgreSQL).0, "score > $3");
        assert_eq!(filter.to_sql(2, DatabaseType::MySQL).0, "score > ?");
    }

    #[test]
    fn test_empty_in_is_false() {
        let filter = Filter::In("id".to_string(), vec![]);
        assert_eq!(filter.to_sql(0, DatabaseType::PostgreSQL).0, "FALSE");
        assert!(!filter.matches(&record()));
    }

    #[test]
    fn test_matches() {
        let rec = record();
        assert!(Filter::Equals("status".into(), "published".into()).matches(&rec));
        assert!(Filter::Gte("score".into(), FilterValue::Int(4)).matches(&rec));
        assert!(Filter::In("id".into(), vec![5.into(), 7.into()]).matches(&rec));
        assert!(Filter::IsNull("deleted_at".into()).matches(&rec));
        assert!(Filter::IsNull("missing".into()).matches(&rec));
        assert!(!Filter::NotEquals("deleted_at".into(), 1.into()).matches(&rec));
        assert!(Filter::not(Filter::Equals("status".into(), "draft".into())).matches(&rec));
        assert!(Filter::None.matches(&rec));
    }
}
