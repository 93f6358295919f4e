//! Deferred batch requests.
//!
//! A [`BatchSpec`] accumulates the derived attributes a caller wants on a
//! parent collection. Nothing runs until a
//! [`Prebatcher`](crate::prebatcher::Prebatcher) materializes it.
//!
//! # Attribute names
//!
//! Every request is stored under exactly one attribute name. Aggregate names
//! are derived as `{association}_{op}` without a column and
//! `{association}_{column}_{op}` with one, e.g. `comments_count` or
//! `comments_score_sum`. Use [`BatchSpec::aggregate_as`] to pick a name
//! explicitly. Adding a request under a name that is already taken replaces
//! the earlier request in place.
//!
//! ```rust
//! use prebatch_query::batch::{AggregateOp, BatchSpec};
//! # use prebatch_query::{Model, RecordKey};
//! # struct Post { id: i64 }
//! # impl Model for Post {
//! #     const MODEL_NAME: &'static str = "Post";
//! #     const TABLE_NAME: &'static str = "posts";
//! #     const PRIMARY_KEY: &'static str = "id";
//! #     const COLUMNS: &'static [&'static str] = &["id"];
//! #     fn key(&self) -> RecordKey { RecordKey::Int(self.id) }
//! # }
//!
//! let spec = BatchSpec::<Post>::new()
//!     .count("comments")
//!     .sum("comments", "score")
//!     .aggregate(AggregateOp::Count, "likes", None);
//!
//! let names: Vec<_> = spec.names().collect();
//! assert_eq!(names, ["comments_count", "comments_score_sum", "likes_count"]);
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use smol_str::{SmolStr, format_smolstr};

use crate::filter::Filter;
use crate::key::RecordKey;

/// Aggregate function applied to each group of child rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    /// Number of child rows (or non-null values of a column).
    Count,
    /// Sum of a numeric column.
    Sum,
    /// Average of a numeric column.
    Avg,
    /// Minimum value of a column.
    Min,
    /// Maximum value of a column.
    Max,
}

impl AggregateOp {
    /// The lowercase name used in derived attribute names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// The SQL aggregate function name.
    pub fn sql_function(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }

    /// Whether this op needs a column to aggregate.
    pub fn requires_column(&self) -> bool {
        !matches!(self, Self::Count)
    }

    /// Whether the result over zero rows is undefined rather than zero.
    pub fn undefined_on_empty(&self) -> bool {
        matches!(self, Self::Avg | Self::Min | Self::Max)
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the attribute name of an aggregate request.
pub fn attribute_name(association: &str, column: Option<&str>, op: AggregateOp) -> SmolStr {
    match column {
        Some(column) => format_smolstr!("{}_{}_{}", association, column, op),
        None => format_smolstr!("{}_{}", association, op),
    }
}

/// How many lookup rows each parent receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    /// The first matching row, or nothing.
    One,
    /// Every matching row.
    #[default]
    Many,
}

/// An aggregate over an association's child rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRequest {
    /// Aggregate function.
    pub op: AggregateOp,
    /// Association on the parent model.
    pub association: SmolStr,
    /// Column to aggregate; required for everything but count.
    pub column: Option<SmolStr>,
}

impl AggregateRequest {
    /// Create an aggregate request.
    pub fn new(op: AggregateOp, association: &str, column: Option<&str>) -> Self {
        Self {
            op,
            association: SmolStr::new(association),
            column: column.map(SmolStr::new),
        }
    }

    /// The derived attribute name of this request.
    pub fn attribute_name(&self) -> SmolStr {
        attribute_name(&self.association, self.column.as_deref(), self.op)
    }
}

type KeyFetcher<M> = Arc<dyn Fn(&M) -> Option<RecordKey> + Send + Sync>;

/// A keyed lookup into an arbitrary table.
///
/// For each parent the fetcher yields a lookup key; rows of `table` whose
/// `key_column` equals that key (and that satisfy `scope`) are attached.
pub struct LookupRequest<M> {
    /// Target table.
    pub table: String,
    /// Column matched against the fetched keys.
    pub key_column: String,
    /// Extra conditions on the target rows.
    pub scope: Filter,
    /// Rows per parent.
    pub cardinality: Cardinality,
    fetch: KeyFetcher<M>,
}

impl<M> LookupRequest<M> {
    /// Create a lookup request.
    pub fn new<F>(
        table: impl Into<String>,
        key_column: impl Into<String>,
        cardinality: Cardinality,
        fetch: F,
    ) -> Self
    where
        F: Fn(&M) -> Option<RecordKey> + Send + Sync + 'static,
    {
        Self {
            table: table.into(),
            key_column: key_column.into(),
            scope: Filter::None,
            cardinality,
            fetch: Arc::new(fetch),
        }
    }

    /// Lookup attaching at most one row per parent.
    pub fn one<F>(table: impl Into<String>, key_column: impl Into<String>, fetch: F) -> Self
    where
        F: Fn(&M) -> Option<RecordKey> + Send + Sync + 'static,
    {
        Self::new(table, key_column, Cardinality::One, fetch)
    }

    /// Lookup attaching every matching row.
    pub fn many<F>(table: impl Into<String>, key_column: impl Into<String>, fetch: F) -> Self
    where
        F: Fn(&M) -> Option<RecordKey> + Send + Sync + 'static,
    {
        Self::new(table, key_column, Cardinality::Many, fetch)
    }

    /// Restrict the target rows further.
    pub fn scope(mut self, filter: Filter) -> Self {
        self.scope = self.scope.and_then(filter);
        self
    }

    /// The lookup key of a parent, if it has one.
    pub fn key_for(&self, parent: &M) -> Option<RecordKey> {
        (self.fetch)(parent)
    }
}

impl<M> Clone for LookupRequest<M> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            key_column: self.key_column.clone(),
            scope: self.scope.clone(),
            cardinality: self.cardinality,
            fetch: Arc::clone(&self.fetch),
        }
    }
}

impl<M> fmt::Debug for LookupRequest<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupRequest")
            .field("table", &self.table)
            .field("key_column", &self.key_column)
            .field("scope", &self.scope)
            .field("cardinality", &self.cardinality)
            .finish_non_exhaustive()
    }
}

/// One pending derived attribute.
pub enum BatchRequest<M> {
    /// Grouped aggregate over an association.
    Aggregate(AggregateRequest),
    /// Keyed lookup into a table.
    Lookup(LookupRequest<M>),
}

impl<M> Clone for BatchRequest<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Aggregate(req) => Self::Aggregate(req.clone()),
            Self::Lookup(req) => Self::Lookup(req.clone()),
        }
    }
}

impl<M> fmt::Debug for BatchRequest<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate(req) => f.debug_tuple("Aggregate").field(req).finish(),
            Self::Lookup(req) => f.debug_tuple("Lookup").field(req).finish(),
        }
    }
}

/// Insertion-ordered map of attribute name to pending request.
///
/// Explicit names (`insert`, `aggregate_as`, `lookup`) overwrite whatever the
/// name held. A derived name that lands on a different request is recorded
/// as ambiguous and rejected when the batch is materialized.
pub struct BatchSpec<M> {
    requests: IndexMap<SmolStr, BatchRequest<M>>,
    ambiguous: IndexSet<SmolStr>,
}

impl<M> BatchSpec<M> {
    /// Create an empty spec.
    pub fn new() -> Self {
        Self {
            requests: IndexMap::new(),
            ambiguous: IndexSet::new(),
        }
    }

    /// Add a request under `name`, replacing any request already there.
    pub fn insert(&mut self, name: impl Into<SmolStr>, request: BatchRequest<M>) {
        let name = name.into();
        self.ambiguous.shift_remove(&name);
        self.requests.insert(name, request);
    }

    /// Add an aggregate under its derived name.
    ///
    /// Repeating an identical request is a no-op. A different request that
    /// derives the same name (`count_column("comments", "score")` and
    /// `count("comments_score")`) marks the name ambiguous.
    pub fn aggregate(mut self, op: AggregateOp, association: &str, column: Option<&str>) -> Self {
        let request = AggregateRequest::new(op, association, column);
        let name = request.attribute_name();
        let collides = match self.requests.get(&name) {
            Some(BatchRequest::Aggregate(existing)) => *existing != request,
            Some(BatchRequest::Lookup(_)) => true,
            None => false,
        };
        self.requests.insert(name.clone(), BatchRequest::Aggregate(request));
        if collides {
            self.ambiguous.insert(name);
        }
        self
    }

    /// Add an aggregate under an explicit name.
    pub fn aggregate_as(
        mut self,
        name: &str,
        op: AggregateOp,
        association: &str,
        column: Option<&str>,
    ) -> Self {
        let request = AggregateRequest::new(op, association, column);
        self.insert(name, BatchRequest::Aggregate(request));
        self
    }

    /// Count child rows: `{association}_count`.
    pub fn count(self, association: &str) -> Self {
        self.aggregate(AggregateOp::Count, association, None)
    }

    /// Count non-null values of a child column: `{association}_{column}_count`.
    pub fn count_column(self, association: &str, column: &str) -> Self {
        self.aggregate(AggregateOp::Count, association, Some(column))
    }

    /// Sum a child column: `{association}_{column}_sum`.
    pub fn sum(self, association: &str, column: &str) -> Self {
        self.aggregate(AggregateOp::Sum, association, Some(column))
    }

    /// Average a child column: `{association}_{column}_avg`.
    pub fn avg(self, association: &str, column: &str) -> Self {
        self.aggregate(AggregateOp::Avg, association, Some(column))
    }

    /// Minimum of a child column: `{association}_{column}_min`.
    pub fn min(self, association: &str, column: &str) -> Self {
        self.aggregate(AggregateOp::Min, association, Some(column))
    }

    /// Maximum of a child column: `{association}_{column}_max`.
    pub fn max(self, association: &str, column: &str) -> Self {
        self.aggregate(AggregateOp::Max, association, Some(column))
    }

    /// Add a keyed lookup under `attribute`.
    pub fn lookup(mut self, attribute: &str, request: LookupRequest<M>) -> Self {
        self.insert(attribute, BatchRequest::Lookup(request));
        self
    }

    /// Merge another spec into this one.
    ///
    /// Requests from `other` replace same-named requests here; new names are
    /// appended in `other`'s order.
    pub fn merge(mut self, other: BatchSpec<M>) -> Self {
        for name in other.requests.keys() {
            self.ambiguous.shift_remove(name);
        }
        self.requests.extend(other.requests);
        self.ambiguous.extend(other.ambiguous);
        self
    }

    /// Derived names claimed by more than one distinct aggregate.
    pub fn ambiguous_names(&self) -> impl Iterator<Item = &str> {
        self.ambiguous.iter().map(SmolStr::as_str)
    }

    /// Get the request stored under `name`.
    pub fn get(&self, name: &str) -> Option<&BatchRequest<M>> {
        self.requests.get(name)
    }

    /// Attribute names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.requests.keys().map(SmolStr::as_str)
    }

    /// Requests in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BatchRequest<M>)> {
        self.requests.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of distinct attributes requested.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no attribute has been requested.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl<M> Default for BatchSpec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for BatchSpec<M> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            ambiguous: self.ambiguous.clone(),
        }
    }
}

impl<M> fmt::Debug for BatchSpec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.requests.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Post {
        author_id: Option<i64>,
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(attribute_name("comments", None, AggregateOp::Count), "comments_count");
        assert_eq!(
            attribute_name("comments", Some("score"), AggregateOp::Avg),
            "comments_score_avg"
        );
    }

    #[test]
    fn test_op_properties() {
        assert!(!AggregateOp::Count.requires_column());
        assert!(AggregateOp::Sum.requires_column());
        assert!(!AggregateOp::Sum.undefined_on_empty());
        assert!(AggregateOp::Max.undefined_on_empty());
        assert_eq!(AggregateOp::Avg.sql_function(), "AVG");
    }

    #[test]
    fn test_same_name_overwrites_in_place() {
        let spec = BatchSpec::<Post>::new()
            .count("comments")
            .sum("comments", "score")
            .aggregate_as("comments_count", AggregateOp::Count, "replies", None);

        assert_eq!(spec.len(), 2);
        assert_eq!(spec.names().collect::<Vec<_>>(), ["comments_count", "comments_score_sum"]);
        match spec.get("comments_count") {
            Some(BatchRequest::Aggregate(req)) => assert_eq!(req.association, "replies"),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_colliding_derived_names_are_ambiguous() {
        let spec = BatchSpec::<Post>::new()
            .count_column("comments", "score")
            .count("comments_score");

        assert_eq!(spec.len(), 1);
        assert_eq!(spec.ambiguous_names().collect::<Vec<_>>(), ["comments_score_count"]);

        let repeated = BatchSpec::<Post>::new().count("comments").count("comments");
        assert_eq!(repeated.ambiguous_names().count(), 0);

        let renamed = spec.aggregate_as("comments_score_count", AggregateOp::Count, "comments", None);
        assert_eq!(renamed.ambiguous_names().count(), 0);
    }

    #[test]
    fn test_merge_last_write_wins() {
        let left = BatchSpec::<Post>::new().count("comments").max("comments", "score");
        let right = BatchSpec::<Post>::new()
            .count("likes")
            .aggregate_as("comments_count", AggregateOp::Count, "comments", Some("body"));

        let merged = left.merge(right);
        assert_eq!(
            merged.names().collect::<Vec<_>>(),
            ["comments_count", "comments_score_max", "likes_count"]
        );
        match merged.get("comments_count") {
            Some(BatchRequest::Aggregate(req)) => assert_eq!(req.column.as_deref(), Some("body")),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_lookup_request() {
        let lookup = LookupRequest::one("users", "id", |p: &Post| p.author_id.map(RecordKey::Int))
            .scope(Filter::Equals("active".into(), true.into()));

        assert_eq!(lookup.cardinality, Cardinality::One);
        assert_eq!(lookup.key_for(&Post { author_id: Some(9) }), Some(RecordKey::Int(9)));
        assert_eq!(lookup.key_for(&Post { author_id: None }), None);
        assert!(!lookup.scope.is_none());

        let spec = BatchSpec::new().lookup("author", lookup.clone()).lookup("author", lookup);
        assert_eq!(spec.len(), 1);
        assert!(matches!(spec.get("author"), Some(BatchRequest::Lookup(_))));
    }
}
