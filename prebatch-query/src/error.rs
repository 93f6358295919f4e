//! Error types for batch resolution and execution.
//!
//! Every failure the batcher raises itself carries an [`ErrorCode`], a
//! message, and an [`ErrorContext`] naming the model, association, and
//! attribute involved. Errors produced by a [`BatchEngine`](crate::traits::BatchEngine)
//! are passed through to the caller untouched.
//!
//! # Error Codes
//!
//! Codes follow the pattern `B{category}{number}`:
//! - 11xx: Request and relationship errors (raised before any query runs)
//! - 5xxx: Execution errors reported by engines
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use prebatch_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::unresolved_relationship("User", "posts");
//! assert_eq!(err.code, ErrorCode::UnresolvedRelationship);
//! assert!(err.is_relationship_error());
//! assert!(err.to_string().contains("posts"));
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for batch operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Request errors (11xx)
    /// Association name is unknown for the parent model (B1101).
    UnresolvedRelationship = 1101,
    /// Child model has no inverse relation back to the parent (B1102).
    MissingInverseRelationship = 1102,
    /// Association kind cannot be grouped by a child foreign key (B1103).
    UnsupportedRelation = 1103,
    /// Aggregate request is malformed (B1104).
    InvalidAggregate = 1104,
    /// Attribute name is empty (B1105).
    InvalidAttributeName = 1105,
    /// Attribute name shadows a model column or another request (B1106).
    AttributeConflict = 1106,

    // Execution errors (5xxx)
    /// General database error (B5005).
    DatabaseError = 5005,

    // Configuration errors (7xxx)
    /// Invalid configuration (B7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (B9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "B1101").
    pub fn code(&self) -> String {
        format!("B{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnresolvedRelationship => "Unresolved relationship",
            Self::MissingInverseRelationship => "Missing inverse relationship",
            Self::UnsupportedRelation => "Unsupported relation kind",
            Self::InvalidAggregate => "Invalid aggregate request",
            Self::InvalidAttributeName => "Invalid attribute name",
            Self::AttributeConflict => "Attribute name conflict",
            Self::DatabaseError => "Database error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }

    /// Whether this code is raised during request validation, before any query.
    pub fn is_request_error(&self) -> bool {
        (*self as u16) / 100 == 11
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
    /// Optional code example.
    pub code: Option<String>,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            code: None,
        }
    }

    /// Add a code example.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The parent model involved.
    pub model: Option<String>,
    /// The association involved.
    pub association: Option<String>,
    /// The derived attribute involved.
    pub attribute: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors raised while resolving or executing a batch.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Add a code suggestion.
    pub fn with_code_suggestion(mut self, text: impl Into<String>, code: impl Into<String>) -> Self {
        self.context
            .suggestions
            .push(Suggestion::new(text).with_code(code));
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the parent model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the association.
    pub fn with_association(mut self, association: impl Into<String>) -> Self {
        self.context.association = Some(association.into());
        self
    }

    /// Set the derived attribute.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.context.attribute = Some(attribute.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// The association is not declared on the parent model.
    pub fn unresolved_relationship(model: impl Into<String>, association: impl Into<String>) -> Self {
        let model = model.into();
        let association = association.into();
        Self::new(
            ErrorCode::UnresolvedRelationship,
            format!("`{}` has no association named `{}`", model, association),
        )
        .with_model(&model)
        .with_association(&association)
        .with_suggestion("Check the association name for typos")
        .with_code_suggestion(
            "Register the relation on the parent model",
            format!(
                "registry.register(\"{}\", RelationSpec::one_to_many(\"{}\", \"Child\", \"children\"))",
                model, association
            ),
        )
    }

    /// The child model does not declare the way back to the parent.
    pub fn missing_inverse(
        model: impl Into<String>,
        association: impl Into<String>,
        child_model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let association = association.into();
        let child_model = child_model.into();
        Self::new(
            ErrorCode::MissingInverseRelationship,
            format!(
                "`{}` does not have an inverse of `{}#{}`",
                child_model, model, association
            ),
        )
        .with_model(&model)
        .with_association(&association)
        .with_suggestion(format!(
            "Declare a many-to-one relation from `{}` back to `{}`",
            child_model, model
        ))
        .with_help("The inverse relation names the foreign key used to group child rows")
    }

    /// The association kind cannot be grouped by a child foreign key.
    pub fn unsupported_relation(
        model: impl Into<String>,
        association: impl Into<String>,
        kind: impl fmt::Display,
    ) -> Self {
        let model = model.into();
        let association = association.into();
        Self::new(
            ErrorCode::UnsupportedRelation,
            format!(
                "`{}#{}` is a {} relation; only one-to-many and one-to-one relations can be batched",
                model, association, kind
            ),
        )
        .with_model(&model)
        .with_association(&association)
        .with_suggestion("Use a lookup request for keyed access to the related rows")
    }

    /// An aggregate that needs a column was requested without one.
    pub fn invalid_aggregate(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        let attribute = attribute.into();
        let message = message.into();
        Self::new(
            ErrorCode::InvalidAggregate,
            format!("Invalid aggregate `{}`: {}", attribute, message),
        )
        .with_attribute(&attribute)
    }

    /// An attribute name is empty.
    pub fn invalid_attribute_name(attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        Self::new(
            ErrorCode::InvalidAttributeName,
            format!("Invalid attribute name `{}`", attribute),
        )
        .with_attribute(&attribute)
        .with_suggestion("Attribute names must be non-empty")
    }

    /// A derived attribute would shadow a column of the parent model.
    pub fn attribute_conflict(model: impl Into<String>, attribute: impl Into<String>) -> Self {
        let model = model.into();
        let attribute = attribute.into();
        Self::new(
            ErrorCode::AttributeConflict,
            format!("Attribute `{}` collides with column `{}.{}`", attribute, model, attribute),
        )
        .with_model(&model)
        .with_attribute(&attribute)
        .with_suggestion("Pick an explicit name with `aggregate_as`")
    }

    /// Two different aggregates derived the same attribute name.
    pub fn ambiguous_attribute(attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        Self::new(
            ErrorCode::AttributeConflict,
            format!(
                "Different aggregates both derive the attribute name `{}`",
                attribute
            ),
        )
        .with_attribute(&attribute)
        .with_suggestion("Name one of them explicitly with `aggregate_as`")
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
            .with_suggestion("Check the database logs for more details")
    }

    /// Create a configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Invalid configuration: {}", message),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this is an unresolved or inverse-less relationship.
    pub fn is_relationship_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::UnresolvedRelationship | ErrorCode::MissingInverseRelationship
        )
    }

    /// Check if this error was raised while validating requests.
    pub fn is_request_error(&self) -> bool {
        self.code.is_request_error()
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref association) = self.context.association {
            output.push_str(&format!("  → Association: {}\n", association));
        }
        if let Some(ref attribute) = self.context.attribute {
            output.push_str(&format!("  → Attribute: {}\n", attribute));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!(
                        "     ```\n     {}\n     ```\n",
                        code.replace('\n', "\n     ")
                    ));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}
