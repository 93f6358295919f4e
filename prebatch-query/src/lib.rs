//! # prebatch-query
//!
//! Deferred, grouped attribute batching for parent collections.
//!
//! Attaching a count or a related row to every member of a collection one
//! parent at a time costs one query per parent. This crate collects every
//! requested derived attribute first and runs one grouped query per
//! attribute when the results are needed:
//! - Grouped aggregates (`count`, `sum`, `avg`, `min`, `max`) over associations
//! - Keyed lookups into arbitrary tables, one or many rows per parent
//! - Relationship resolution that insists on a declared inverse
//! - Lazy, idempotent materialization and keyset-paginated streaming
//!
//! ## Requests
//!
//! ```rust
//! use prebatch_query::{AggregateOp, BatchSpec, Model, RecordKey};
//! # struct User { id: i64 }
//! # impl Model for User {
//! #     const MODEL_NAME: &'static str = "User";
//! #     const TABLE_NAME: &'static str = "users";
//! #     const PRIMARY_KEY: &'static str = "id";
//! #     const COLUMNS: &'static [&'static str] = &["id"];
//! #     fn key(&self) -> RecordKey { RecordKey::Int(self.id) }
//! # }
//!
//! let spec = BatchSpec::<User>::new()
//!     .count("posts")
//!     .avg("posts", "rating")
//!     .aggregate_as("latest_post_at", AggregateOp::Max, "posts", Some("created_at"));
//!
//! assert_eq!(spec.len(), 3);
//! assert!(spec.get("posts_rating_avg").is_some());
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use prebatch_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::missing_inverse("User", "drafts", "Draft");
//! assert_eq!(err.code, ErrorCode::MissingInverseRelationship);
//! assert!(err.code.is_request_error());
//! ```

pub mod annotated;
pub mod batch;
pub mod config;
pub mod error;
pub mod filter;
pub mod key;
pub mod logging;
pub mod memory;
pub mod operations;
pub mod prebatcher;
pub mod relations;
pub mod row;
pub mod sql;
pub mod traits;

pub use annotated::{Annotated, Attribute, Binder};
pub use batch::{
    AggregateOp, AggregateRequest, BatchRequest, BatchSpec, Cardinality, LookupRequest,
    attribute_name,
};
pub use config::{EmptyAggregate, EnvSource, MapEnvSource, PrebatchConfig, StdEnvSource};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult, Suggestion};
pub use filter::{Filter, FilterValue};
pub use key::RecordKey;
pub use operations::{
    AggregateExecutor, AggregateResult, GroupedAggregate, LookupExecutor, LookupQuery,
    LookupResult,
};
pub use prebatcher::Prebatcher;
pub use relations::{
    RelationProvider, RelationRegistry, RelationSpec, RelationType, RelationshipMetadata,
    RelationshipResolver, ResolvedRelation,
};
pub use row::{FromRecord, Record, RowError};
pub use sql::DatabaseType;
pub use traits::{BatchEngine, Model, ParentSource};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::annotated::{Annotated, Attribute};
    pub use crate::batch::{AggregateOp, BatchSpec, Cardinality, LookupRequest};
    pub use crate::config::{EmptyAggregate, PrebatchConfig};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::filter::{Filter, FilterValue};
    pub use crate::key::RecordKey;
    pub use crate::prebatcher::Prebatcher;
    pub use crate::relations::{RelationProvider, RelationRegistry, RelationSpec};
    pub use crate::row::{FromRecord, Record};
    pub use crate::traits::{BatchEngine, Model, ParentSource};
}
