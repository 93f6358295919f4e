//! Parents extended with derived attributes.

use std::ops::Deref;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::filter::FilterValue;
use crate::row::{FromRecord, Record, RowError};

/// Value bound to one derived attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Attribute {
    /// Scalar aggregate result.
    Value(FilterValue),
    /// Aggregate that is undefined for this parent (no child rows).
    Absent,
    /// Single-row lookup result.
    One(Option<Record>),
    /// Multi-row lookup result.
    Many(Vec<Record>),
}

impl Attribute {
    /// Whether the attribute holds no value.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent | Self::One(None))
    }

    /// The scalar value, if this is an aggregate result.
    pub fn as_value(&self) -> Option<&FilterValue> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Binds one attribute onto one parent.
pub type Binder<M> = Box<dyn Fn(&mut Annotated<M>) + Send + Sync>;

/// A parent record plus its derived attributes, in binding order.
///
/// Derefs to the wrapped record so model fields stay directly reachable.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotated<M> {
    record: M,
    attributes: IndexMap<SmolStr, Attribute>,
}

impl<M> Annotated<M> {
    /// Wrap a record with no attributes.
    pub fn new(record: M) -> Self {
        Self {
            record,
            attributes: IndexMap::new(),
        }
    }

    /// The wrapped record.
    pub fn record(&self) -> &M {
        &self.record
    }

    /// Unwrap the record, dropping every attribute.
    pub fn into_inner(self) -> M {
        self.record
    }

    /// Bind an attribute, replacing any previous value.
    pub fn set(&mut self, name: impl Into<SmolStr>, value: Attribute) {
        self.attributes.insert(name.into(), value);
    }

    /// Get an attribute by name.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Whether an attribute has been bound.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Bound attributes in binding order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// An aggregate value, if bound and defined.
    pub fn value(&self, name: &str) -> Option<&FilterValue> {
        self.get(name).and_then(Attribute::as_value)
    }

    /// An integer aggregate such as a count.
    pub fn count(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(FilterValue::as_i64)
    }

    /// The row bound by a single-row lookup.
    pub fn one(&self, name: &str) -> Option<&Record> {
        match self.get(name)? {
            Attribute::One(row) => row.as_ref(),
            _ => None,
        }
    }

    /// The rows bound by a multi-row lookup. Empty when unbound.
    pub fn many(&self, name: &str) -> &[Record] {
        match self.get(name) {
            Some(Attribute::Many(rows)) => rows,
            _ => &[],
        }
    }

    /// Convert the row of a single-row lookup.
    pub fn one_as<T: FromRecord>(&self, name: &str) -> Result<Option<T>, RowError> {
        self.one(name).map(T::from_record).transpose()
    }

    /// Convert the rows of a multi-row lookup.
    pub fn many_as<T: FromRecord>(&self, name: &str) -> Result<Vec<T>, RowError> {
        self.many(name).iter().map(T::from_record).collect()
    }
}

impl<M> Deref for Annotated<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.record
    }
}
