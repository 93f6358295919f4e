//! Relationship resolution.
//!
//! A [`RelationProvider`] reports what it knows about an association; the
//! [`RelationshipResolver`] turns that into a [`ResolvedRelation`] or fails.
//! Every failure here happens before any query for the association runs.

use std::collections::HashMap;
use std::sync::Arc;

use smol_str::SmolStr;
use tracing::debug;

use super::spec::RelationType;
use crate::error::{QueryError, QueryResult};

/// Raw relation metadata, as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMetadata {
    /// The association name on the parent.
    pub association: String,
    /// Kind of relation.
    pub relation_type: RelationType,
    /// The child model name.
    pub child_model: String,
    /// The child table name.
    pub child_table: String,
    /// Foreign key column on the child table, if known.
    pub foreign_key: Option<String>,
    /// Name of the child-side relation pointing back at the parent.
    pub inverse: Option<String>,
}

/// Source of relationship metadata.
pub trait RelationProvider: Send + Sync {
    /// Look up an association of `model`, or `None` if it is not declared.
    fn relation(&self, model: &str, association: &str) -> Option<RelationshipMetadata>;
}

impl<P: RelationProvider + ?Sized> RelationProvider for Arc<P> {
    fn relation(&self, model: &str, association: &str) -> Option<RelationshipMetadata> {
        (**self).relation(model, association)
    }
}

/// A validated relation: child rows can be grouped by `foreign_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelation {
    /// The association name on the parent.
    pub association: String,
    /// The child model name.
    pub child_model: String,
    /// The child table name.
    pub child_table: String,
    /// Foreign key column on the child table.
    pub foreign_key: String,
    /// Name of the child-side inverse relation.
    pub inverse: String,
}

/// Validates associations against a [`RelationProvider`].
#[derive(Clone)]
pub struct RelationshipResolver {
    provider: Arc<dyn RelationProvider>,
}

impl RelationshipResolver {
    /// Create a resolver over a provider.
    pub fn new(provider: Arc<dyn RelationProvider>) -> Self {
        Self { provider }
    }

    /// Resolve `association` on `parent_model`.
    pub fn resolve(&self, parent_model: &str, association: &str) -> QueryResult<ResolvedRelation> {
        let meta = self
            .provider
            .relation(parent_model, association)
            .ok_or_else(|| QueryError::unresolved_relationship(parent_model, association))?;

        if !meta.relation_type.is_parent_side() {
            return Err(QueryError::unsupported_relation(
                parent_model,
                association,
                meta.relation_type,
            ));
        }

        let (Some(inverse), Some(foreign_key)) = (meta.inverse, meta.foreign_key) else {
            return Err(QueryError::missing_inverse(
                parent_model,
                association,
                meta.child_model,
            ));
        };

        debug!(
            model = parent_model,
            association,
            child = %meta.child_model,
            foreign_key = %foreign_key,
            "Resolved relation"
        );

        Ok(ResolvedRelation {
            association: meta.association,
            child_model: meta.child_model,
            child_table: meta.child_table,
            foreign_key,
            inverse,
        })
    }
}

impl std::fmt::Debug for RelationshipResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipResolver").finish_non_exhaustive()
    }
}

/// Per-pass memo so each association is resolved once per materialization.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    resolved: HashMap<SmolStr, ResolvedRelation>,
}

impl ResolutionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve through the cache.
    pub fn resolve(
        &mut self,
        resolver: &RelationshipResolver,
        parent_model: &str,
        association: &str,
    ) -> QueryResult<ResolvedRelation> {
        if let Some(hit) = self.resolved.get(association) {
            return Ok(hit.clone());
        }
        let relation = resolver.resolve(parent_model, association)?;
        self.resolved
            .insert(SmolStr::new(association), relation.clone());
        Ok(relation)
    }

    /// Number of distinct associations resolved so far.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Whether nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorCode;
    use crate::relations::{RelationRegistry, RelationSpec};

    fn resolver() -> RelationshipResolver {
        let registry = RelationRegistry::new()
            .with("User", RelationSpec::one_to_many("posts", "Post", "posts"))
            .with("User", RelationSpec::one_to_many("drafts", "Draft", "drafts"))
            .with("User", RelationSpec::many_to_one("team", "Team", "teams"))
            .with("Post", RelationSpec::many_to_one("user", "User", "users"));
        RelationshipResolver::new(Arc::new(registry))
    }

    #[test]
    fn test_resolve_ok() {
        let relation = resolver().resolve("User", "posts").unwrap();
        assert_eq!(relation.child_table, "posts");
        assert_eq!(relation.foreign_key, "user_id");
        assert_eq!(relation.inverse, "user");
    }

    #[test]
    fn test_resolve_unknown() {
        let err = resolver().resolve("User", "likes").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnresolvedRelationship);
    }

    #[test]
    fn test_resolve_missing_inverse() {
        let err = resolver().resolve("User", "drafts").unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingInverseRelationship);
        assert!(err.message.contains("`Draft`"));
    }

    #[test]
    fn test_resolve_many_to_one_unsupported() {
        let err = resolver().resolve("User", "team").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedRelation);
    }

    struct CountingProvider {
        inner: RelationRegistry,
        calls: AtomicUsize,
    }

    impl RelationProvider for CountingProvider {
        fn relation(&self, model: &str, association: &str) -> Option<RelationshipMetadata> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.relation(model, association)
        }
    }

    #[test]
    fn test_cache_resolves_once() {
        let provider = Arc::new(CountingProvider {
            inner: RelationRegistry::new()
                .with("User", RelationSpec::one_to_many("posts", "Post", "posts"))
                .with("Post", RelationSpec::many_to_one("user", "User", "users")),
            calls: AtomicUsize::new(0),
        });
        let resolver = RelationshipResolver::new(provider.clone());
        let mut cache = ResolutionCache::new();

        cache.resolve(&resolver, "User", "posts").unwrap();
        cache.resolve(&resolver, "User", "posts").unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
