//! Error types shared by the query pipeline.

use std::fmt;

use thiserror::Error;

use crate::storage::Dialect;

/// Why a single field of a query was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// The operator needs values and none (or a blank one) were given.
    Blank,
    /// A value does not parse for the field's value kind.
    Invalid,
    /// The operator exists but is not offered for this field.
    OperatorNotAllowed,
    /// The operator symbol is not known at all.
    UnknownOperator,
    /// The field is not among the available filters for this actor/context.
    UnknownFilter,
    NotGroupable,
    NotTotalable,
    /// A role-restricted query without roles.
    RolesRequired,
    /// A private query without an owner.
    OwnerRequired,
}

impl FieldErrorKind {
    fn message(self) -> &'static str {
        match self {
            FieldErrorKind::Blank => "cannot be blank",
            FieldErrorKind::Invalid => "is invalid",
            FieldErrorKind::OperatorNotAllowed => "does not accept this operator",
            FieldErrorKind::UnknownOperator => "has an unknown operator",
            FieldErrorKind::UnknownFilter => "is not an available filter",
            FieldErrorKind::NotGroupable => "cannot be used for grouping",
            FieldErrorKind::NotTotalable => "cannot be totaled",
            FieldErrorKind::RolesRequired => "roles cannot be blank",
            FieldErrorKind::OwnerRequired => "owner cannot be blank",
        }
    }
}

/// A validation failure attached to one field of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.kind.message())
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("statement compiled for {expected:?} but storage speaks {actual:?}")]
    DialectMismatch { expected: Dialect, actual: Dialect },

    #[error("unexpected value in result column {column}: {found}")]
    Decode { column: usize, found: String },

    #[error("cannot bind value {0}")]
    UnsupportedValue(String),
}

/// Errors surfaced by query evaluation.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Validation failed; every bad field is listed.
    #[error("invalid query: {}", join_errors(.0))]
    Invalid(Vec<FieldError>),

    /// Storage rejected a compiled statement. Never caused by filter values.
    #[error("query execution failed: {0}")]
    Execution(#[from] StorageError),

    /// The predicate lost its visibility restriction. Programmer error.
    #[error("security invariant violated: {0}")]
    SecurityInvariant(String),

    #[error("column `{0}` is not totalable")]
    NotTotalable(String),

    #[error("query is not grouped")]
    NotGrouped,
}

impl QueryError {
    /// Field errors carried by an invalid query, empty for other variants.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            QueryError::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

/// Result alias for query evaluation.
pub type QueryResult<T> = Result<T, QueryError>;
