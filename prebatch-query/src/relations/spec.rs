//! Relation specification types and the in-memory relation registry.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use super::resolver::{RelationProvider, RelationshipMetadata};

/// Type of relation between models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// One-to-one relation (e.g., User has one Profile).
    OneToOne,
    /// One-to-many relation (e.g., User has many Posts).
    OneToMany,
    /// Many-to-one relation (e.g., Post belongs to User).
    ManyToOne,
    /// Many-to-many relation (e.g., Post has many Tags).
    ManyToMany,
}

impl RelationType {
    /// Check if the foreign key of this relation lives on the related model.
    pub fn is_parent_side(&self) -> bool {
        matches!(self, Self::OneToMany | Self::OneToOne)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        };
        f.write_str(name)
    }
}

/// Specification for a relation between models.
#[derive(Debug, Clone)]
pub struct RelationSpec {
    /// Name of the relation (field name).
    pub name: String,
    /// Type of relation.
    pub relation_type: RelationType,
    /// Name of the related model.
    pub related_model: String,
    /// Name of the related table.
    pub related_table: String,
    /// Foreign key column.
    ///
    /// For many-to-one relations this is the column on the declaring model.
    /// For one-to-many and one-to-one relations it is the column on the
    /// related model, and is normally taken from the inverse instead.
    pub foreign_key: Option<String>,
    /// Name of the relation on the related model that points back here.
    pub inverse_of: Option<String>,
}

impl RelationSpec {
    fn new(
        name: impl Into<String>,
        relation_type: RelationType,
        related_model: impl Into<String>,
        related_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            relation_type,
            related_model: related_model.into(),
            related_table: related_table.into(),
            foreign_key: None,
            inverse_of: None,
        }
    }

    /// Create a one-to-one relation spec.
    pub fn one_to_one(
        name: impl Into<String>,
        related_model: impl Into<String>,
        related_table: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationType::OneToOne, related_model, related_table)
    }

    /// Create a one-to-many relation spec.
    pub fn one_to_many(
        name: impl Into<String>,
        related_model: impl Into<String>,
        related_table: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationType::OneToMany, related_model, related_table)
    }

    /// Create a many-to-one relation spec.
    pub fn many_to_one(
        name: impl Into<String>,
        related_model: impl Into<String>,
        related_table: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationType::ManyToOne, related_model, related_table)
    }

    /// Create a many-to-many relation spec.
    pub fn many_to_many(
        name: impl Into<String>,
        related_model: impl Into<String>,
        related_table: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationType::ManyToMany, related_model, related_table)
    }

    /// Set the foreign key column.
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Name the inverse relation on the related model explicitly.
    pub fn inverse_of(mut self, name: impl Into<String>) -> Self {
        self.inverse_of = Some(name.into());
        self
    }

    /// The foreign key column of a many-to-one relation, defaulting to
    /// `{name}_id`.
    pub fn owning_foreign_key(&self) -> String {
        self.foreign_key
            .clone()
            .unwrap_or_else(|| format!("{}_id", self.name))
    }
}

/// Registry of relation specifications, keyed by model name.
///
/// Relations keep their registration order per model.
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    models: HashMap<String, IndexMap<String, RelationSpec>>,
}

impl RelationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation on a model. Re-registering a name replaces it.
    pub fn register(&mut self, model: impl Into<String>, spec: RelationSpec) {
        self.models
            .entry(model.into())
            .or_default()
            .insert(spec.name.clone(), spec);
    }

    /// Register a relation, builder style.
    pub fn with(mut self, model: impl Into<String>, spec: RelationSpec) -> Self {
        self.register(model, spec);
        self
    }

    /// Get a relation by model and name.
    pub fn get(&self, model: &str, name: &str) -> Option<&RelationSpec> {
        self.models.get(model)?.get(name)
    }

    /// Get all relations of a model.
    pub fn relations_of(&self, model: &str) -> impl Iterator<Item = &RelationSpec> {
        self.models.get(model).into_iter().flat_map(|r| r.values())
    }

    /// Find the many-to-one relation on `child_model` pointing back at
    /// `parent_model`.
    ///
    /// An explicit `inverse_of` name wins. Otherwise the inverse is inferred
    /// only when exactly one candidate exists.
    fn inverse_for(&self, spec: &RelationSpec, parent_model: &str) -> Option<&RelationSpec> {
        let points_back = |r: &&RelationSpec| {
            r.relation_type == RelationType::ManyToOne && r.related_model == parent_model
        };

        if let Some(ref name) = spec.inverse_of {
            return self.get(&spec.related_model, name).filter(points_back);
        }

        let mut candidates = self.relations_of(&spec.related_model).filter(points_back);
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }
}

impl RelationProvider for RelationRegistry {
    fn relation(&self, model: &str, association: &str) -> Option<RelationshipMetadata> {
        let spec = self.get(model, association)?;
        let inverse = spec
            .relation_type
            .is_parent_side()
            .then(|| self.inverse_for(spec, model))
            .flatten();

        Some(RelationshipMetadata {
            association: spec.name.clone(),
            relation_type: spec.relation_type,
            child_model: spec.related_model.clone(),
            child_table: spec.related_table.clone(),
            foreign_key: inverse
                .map(RelationSpec::owning_foreign_key)
                .or_else(|| spec.foreign_key.clone()),
            inverse: inverse.map(|r| r.name.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> RelationRegistry {
        RelationRegistry::new()
            .with("User", RelationSpec::one_to_many("posts", "Post", "posts"))
            .with("User", RelationSpec::one_to_many("drafts", "Draft", "drafts"))
            .with("Post", RelationSpec::many_to_one("author", "User", "users").foreign_key("author_id"))
            .with("Post", RelationSpec::one_to_many("comments", "Comment", "comments"))
            .with("Comment", RelationSpec::many_to_one("post", "Post", "posts"))
    }

    #[test]
    fn test_relation_type() {
        assert!(RelationType::OneToOne.is_parent_side());
        assert!(!RelationType::ManyToOne.is_parent_side());
        assert_eq!(RelationType::ManyToMany.to_string(), "many-to-many");
    }

    #[test]
    fn test_inferred_inverse_uses_explicit_foreign_key() {
        let meta = blog().relation("User", "posts").unwrap();
        assert_eq!(meta.child_model, "Post");
        assert_eq!(meta.inverse.as_deref(), Some("author"));
        assert_eq!(meta.foreign_key.as_deref(), Some("author_id"));
    }

    #[test]
    fn test_inferred_inverse_defaults_foreign_key() {
        let meta = blog().relation("Post", "comments").unwrap();
        assert_eq!(meta.inverse.as_deref(), Some("post"));
        assert_eq!(meta.foreign_key.as_deref(), Some("post_id"));
    }

    #[test]
    fn test_missing_inverse_is_reported_as_absent() {
        let meta = blog().relation("User", "drafts").unwrap();
        assert_eq!(meta.inverse, None);
    }

    #[test]
    fn test_ambiguous_inverse_requires_explicit_name() {
        let registry = RelationRegistry::new()
            .with("User", RelationSpec::one_to_many("reviews", "Review", "reviews"))
            .with("Review", RelationSpec::many_to_one("author", "User", "users"))
            .with("Review", RelationSpec::many_to_one("editor", "User", "users"));
        assert_eq!(registry.relation("User", "reviews").unwrap().inverse, None);

        let registry = registry.with(
            "User",
            RelationSpec::one_to_many("reviews", "Review", "reviews").inverse_of("editor"),
        );
        let meta = registry.relation("User", "reviews").unwrap();
        assert_eq!(meta.inverse.as_deref(), Some("editor"));
        assert_eq!(meta.foreign_key.as_deref(), Some("editor_id"));
    }

    #[test]
    fn test_unknown_relation() {
        assert!(blog().relation("User", "followers").is_none());
        assert!(blog().relation("Nobody", "posts").is_none());
    }
}
