//! Parameter-safe SQL composition
//!
//! Statements are assembled from structured condition/data maps plus raw
//! fragments ("literals") whose own placeholders are rewritten to
//! process-unique names, so nesting or reusing a fragment never collides
//! with other parameters in the same statement.

pub mod builder;
pub mod literal;

use indexmap::IndexMap;

pub use builder::{delete, insert, select, update, where_clause, Conditions, Statement};
pub use literal::{default_factory, LiteralArgs, LiteralFactory, LiteralSequence, SqlExpr, SqlFragment};

/// Named arguments bound into a statement, in insertion order.
pub type SqlArgs = IndexMap<String, SqlValue>;

/// A scalar cell value, as bound into a query or returned in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Int(n)
    }
}

impl From<i32> for SqlValue {
    fn from(n: i32) -> Self {
        SqlValue::Int(n.into())
    }
}

impl From<u32> for SqlValue {
    fn from(n: u32) -> Self {
        SqlValue::Int(n.into())
    }
}

impl From<f64> for SqlValue {
    fn from(n: f64) -> Self {
        SqlValue::Float(n)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SqlError {
    #[error("literal parsing error: argument counts do not match (got {supplied}, found {found})")]
    MalformedLiteral { supplied: usize, found: usize },

    #[error("no argument supplied for placeholder '{0}'")]
    MissingArgument(String),

    #[error("INSERT value for column '{0}' must be a scalar or value literal")]
    InvalidInsertValue(String),
}
