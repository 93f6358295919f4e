//! SQL rendering helpers shared by the grouped query types.

use serde::Deserialize;

/// Escape a string for use in SQL (for identifiers, not values).
pub fn escape_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Check if an identifier needs quoting.
pub fn needs_quoting(name: &str) -> bool {
    let reserved = [
        "user", "order", "group", "select", "from", "where", "table", "index", "key", "primary",
        "foreign", "check", "default", "null", "not", "and", "or", "in", "is", "like", "between",
        "case", "when", "then", "else", "end", "as", "on", "join", "left", "right", "inner",
        "outer", "limit", "offset", "union", "all", "distinct", "having", "count", "sum", "avg",
        "min", "max",
    ];

    if reserved.contains(&name.to_lowercase().as_str()) {
        return true;
    }

    !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote an identifier if needed.
pub fn quote_identifier(name: &str) -> String {
    if needs_quoting(name) {
        escape_identifier(name)
    } else {
        name.to_string()
    }
}

/// SQL dialect used when rendering grouped queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// PostgreSQL uses $1, $2, etc.
    #[default]
    #[serde(alias = "postgres")]
    PostgreSQL,
    /// MySQL uses ?, ?, etc.
    MySQL,
    /// SQLite uses ?, ?, etc.
    SQLite,
}

impl DatabaseType {
    /// Get the parameter placeholder for this database type.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", index),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// Parse a dialect name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Some(Self::PostgreSQL),
            "mysql" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }
}
