//! Value validation: operator membership, arity and per-kind lexical checks.
//!
//! Errors are collected across every clause. Stored clauses that no longer
//! resolve to an available filter are dropped; explicit ones are errors.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{FieldError, FieldErrorKind};
use crate::model::ValueKind;
use crate::operators::{parse_date, parse_timestamp, Arity, DateEnv, Operator};
use crate::query::{ClauseOrigin, Query, QueryVisibility};
use crate::registry::{FilterDefinition, QueryColumn};

/// A clause that passed validation, bound to its definition.
#[derive(Debug, Clone)]
pub struct ActiveClause<'d> {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
    pub definition: &'d FilterDefinition,
}

#[derive(Debug, Default)]
pub struct Validation<'d> {
    pub clauses: Vec<ActiveClause<'d>>,
    pub errors: Vec<FieldError>,
}

impl Validation<'_> {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn is_integer(value: &str) -> bool {
    value.trim().parse::<i64>().is_ok()
}

fn is_id_list(value: &str) -> bool {
    value.split(',').all(is_integer)
}

fn check_arity(op: Operator, kind: ValueKind, values: &[String]) -> Option<FieldErrorKind> {
    let blank_at = |idx: usize| values.get(idx).map_or(true, |v| is_blank(v));
    let blank = match op.arity() {
        Arity::Zero => false,
        Arity::One => blank_at(0),
        // Date ranges may be open on the right.
        Arity::Two => blank_at(0) || (!kind.is_date() && blank_at(1)),
        Arity::Many => values.iter().all(|v| is_blank(v)),
    };
    blank.then_some(FieldErrorKind::Blank)
}

fn check_value(op: Operator, kind: ValueKind, value: &str, env: &DateEnv) -> bool {
    if op.takes_day_count() {
        return is_integer(value);
    }
    match op {
        Operator::RelatedToProject
        | Operator::RelatedOutsideProject
        | Operator::NotRelatedToProject => return is_integer(value),
        _ => {}
    }
    let list_op = matches!(op, Operator::Equals | Operator::NotEquals);
    match kind {
        ValueKind::Integer if list_op => is_id_list(value),
        ValueKind::Integer => is_integer(value),
        ValueKind::Float => value.trim().parse::<f64>().is_ok_and(f64::is_finite),
        ValueKind::Date => parse_date(value).is_some(),
        ValueKind::DateTime => parse_date(value).is_some() || parse_timestamp(value, env).is_some(),
        ValueKind::Relation | ValueKind::Tree if list_op => is_id_list(value),
        _ => true,
    }
}

/// Checks one clause against its definition.
pub fn check_clause(
    definition: &FilterDefinition,
    op: Operator,
    values: &[String],
    env: &DateEnv,
) -> Option<FieldErrorKind> {
    if !definition.operators.contains(op) {
        return Some(FieldErrorKind::OperatorNotAllowed);
    }
    if let Some(kind) = check_arity(op, definition.value_kind, values) {
        return Some(kind);
    }
    if op.arity() == Arity::Zero {
        return None;
    }
    let invalid = values
        .iter()
        .filter(|v| !is_blank(v))
        .any(|v| !check_value(op, definition.value_kind, v, env));
    invalid.then_some(FieldErrorKind::Invalid)
}

/// Validates filters, grouping, totals and the visibility definition.
pub fn validate_query<'d>(
    query: &Query,
    filters: &'d IndexMap<String, FilterDefinition>,
    columns: &IndexMap<String, QueryColumn>,
    env: &DateEnv,
) -> Validation<'d> {
    let mut validation = Validation::default();

    for (key, clause) in &query.filters {
        let Some(definition) = filters.get(key) else {
            match clause.origin {
                ClauseOrigin::Stored => debug!(field = %key, "stale filter dropped"),
                ClauseOrigin::Explicit => validation
                    .errors
                    .push(FieldError::new(key.as_str(), FieldErrorKind::UnknownFilter)),
            }
            continue;
        };
        let Some(op) = clause.operator() else {
            validation
                .errors
                .push(FieldError::new(key.as_str(), FieldErrorKind::UnknownOperator));
            continue;
        };
        match check_clause(definition, op, &clause.values, env) {
            Some(kind) => validation.errors.push(FieldError::new(key.as_str(), kind)),
            None => validation.clauses.push(ActiveClause {
                key: key.clone(),
                operator: op,
                values: clause
                    .values
                    .iter()
                    .filter(|v| !is_blank(v))
                    .map(|v| v.trim().to_string())
                    .collect(),
                definition,
            }),
        }
    }

    if let Some(group_by) = query.group_by.as_deref().filter(|g| !g.is_empty()) {
        match columns.get(group_by) {
            Some(column) if column.groupable => {}
            Some(_) => validation
                .errors
                .push(FieldError::new(group_by, FieldErrorKind::NotGroupable)),
            None => debug!(group_by, "stale group key ignored"),
        }
    }

    for name in &query.totalable_names {
        match columns.get(name) {
            Some(column) if column.totalable => {}
            Some(_) => validation
                .errors
                .push(FieldError::new(name.as_str(), FieldErrorKind::NotTotalable)),
            None => debug!(total = %name, "stale total ignored"),
        }
    }

    match &query.visibility {
        QueryVisibility::Roles { role_ids } if role_ids.is_empty() => validation
            .errors
            .push(FieldError::new("visibility", FieldErrorKind::RolesRequired)),
        QueryVisibility::Private { owner: None } => validation
            .errors
            .push(FieldError::new("visibility", FieldErrorKind::OwnerRequired)),
        _ => {}
    }

    validation
}
