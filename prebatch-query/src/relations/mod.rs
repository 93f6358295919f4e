//! Relation metadata and resolution.
//!
//! Batched aggregates group child rows by the foreign key that points back
//! at the parent. That key is only known when the child model declares the
//! inverse relation, so resolution insists on it:
//!
//! ```rust
//! use std::sync::Arc;
//! use prebatch_query::relations::{RelationRegistry, RelationSpec, RelationshipResolver};
//!
//! let registry = RelationRegistry::new()
//!     .with("User", RelationSpec::one_to_many("posts", "Post", "posts"))
//!     .with("Post", RelationSpec::many_to_one("user", "User", "users"));
//!
//! let resolver = RelationshipResolver::new(Arc::new(registry));
//! let posts = resolver.resolve("User", "posts").unwrap();
//! assert_eq!(posts.foreign_key, "user_id");
//!
//! assert!(resolver.resolve("User", "likes").is_err());
//! ```

mod resolver;
mod spec;

pub use resolver::{
    RelationProvider, RelationshipMetadata, RelationshipResolver, ResolutionCache,
    ResolvedRelation,
};
pub use spec::{RelationRegistry, RelationSpec, RelationType};
