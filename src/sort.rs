//! Ordering and grouping expressions derived from query columns.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use sea_query::{Alias, Expr, Order, SimpleExpr};
use serde::Serialize;
use tracing::debug;

use crate::compiler::JoinSet;
use crate::engine::QueryEngine;
use crate::model::EntityKind;
use crate::operators::Operand;
use crate::query::{Query, SortDirection};
use crate::registry::{ColumnSource, QueryColumn};
use crate::storage::Cell;

/// Value of the group column for one group of results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum GroupKey {
    /// Items with no value in the group column.
    None,
    Id(i64),
    Value(String),
}

impl GroupKey {
    pub fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Null => GroupKey::None,
            Cell::Integer(v) => GroupKey::Id(*v),
            Cell::Real(v) => GroupKey::Value(v.to_string()),
            Cell::Text(s) if s.is_empty() => GroupKey::None,
            Cell::Text(s) => GroupKey::Value(s.clone()),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::None => f.write_str("(blank)"),
            GroupKey::Id(id) => write!(f, "{id}"),
            GroupKey::Value(v) => f.write_str(v),
        }
    }
}

fn to_order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}

/// Column expressions for one evaluation. Joins it adds extend those of the
/// compiled predicate.
pub(crate) struct ColumnExprs<'e, 'a> {
    engine: &'e QueryEngine<'a>,
    kind: EntityKind,
    pub joins: JoinSet,
    custom_aliases: HashMap<i64, String>,
}

impl<'e, 'a> ColumnExprs<'e, 'a> {
    pub fn new(engine: &'e QueryEngine<'a>, kind: EntityKind, base: &JoinSet) -> Self {
        Self {
            engine,
            kind,
            joins: base.clone(),
            custom_aliases: HashMap::new(),
        }
    }

    fn table(&self) -> &'static str {
        self.kind.table()
    }

    fn col(&self, table: &str, name: &str) -> SimpleExpr {
        Expr::col((Alias::new(table), Alias::new(name))).into()
    }

    /// Single value row of a custom field, `None` for multi-valued fields.
    fn custom_value(&mut self, field_id: i64) -> Option<Operand> {
        let cf = self.engine.metadata.custom_field(field_id)?;
        if cf.multiple {
            return None;
        }
        let alias = match self.custom_aliases.get(&cf.id) {
            Some(alias) => alias.clone(),
            None => {
                let alias = self.joins.custom_value(
                    self.engine.config,
                    cf.customized.customized_type(),
                    self.kind.table(),
                    cf.id,
                );
                self.custom_aliases.insert(cf.id, alias.clone());
                alias
            }
        };
        Some(Operand::custom_value(&alias, cf.value_kind()))
    }

    /// Hours logged on the item, zero when none.
    pub fn spent_hours(&self) -> SimpleExpr {
        let time_entries = self.engine.config.table_name("time_entries");
        Expr::cust(format!(
            r#"COALESCE((SELECT SUM("te"."hours") FROM "{time_entries}" AS "te" WHERE "te"."issue_id" = "{}"."id"), 0)"#,
            self.table()
        ))
    }

    pub fn sort_exprs(&mut self, column: &QueryColumn) -> Vec<SimpleExpr> {
        match &column.source {
            ColumnSource::Own(name) => vec![self.col(self.table(), name)],
            ColumnSource::Association { association, sort } => {
                let alias = self
                    .joins
                    .association(self.engine.config, self.table(), *association);
                sort.iter().map(|name| self.col(alias, name)).collect()
            }
            ColumnSource::User(association) => {
                let alias = self
                    .joins
                    .association(self.engine.config, self.table(), *association);
                self.engine
                    .config
                    .user_name_format
                    .order_columns()
                    .iter()
                    .chain(["id"].iter())
                    .map(|name| self.col(alias, name))
                    .collect()
            }
            ColumnSource::CustomField(id) => match self.custom_value(*id) {
                Some(operand) if operand.kind.is_numeric() => {
                    vec![operand.numeric(self.engine.config.dialect).into()]
                }
                Some(operand) => vec![operand.col().into()],
                None => Vec::new(),
            },
            ColumnSource::SpentHours => vec![self.spent_hours()],
        }
    }

    /// Expression whose distinct values identify a group.
    pub fn group_key(&mut self, column: &QueryColumn) -> Option<SimpleExpr> {
        match &column.source {
            ColumnSource::Own(name) => Some(self.col(self.table(), name)),
            ColumnSource::Association { association, .. } | ColumnSource::User(association) => {
                Some(self.col(self.table(), association.foreign_key()))
            }
            ColumnSource::CustomField(id) => {
                self.custom_value(*id).map(|operand| operand.col().into())
            }
            ColumnSource::SpentHours => None,
        }
    }

    /// Summable expression of a totalable column.
    pub fn total_expr(&mut self, column: &QueryColumn) -> Option<SimpleExpr> {
        match &column.source {
            ColumnSource::Own(name) => Some(self.col(self.table(), name)),
            ColumnSource::CustomField(id) => self
                .custom_value(*id)
                .map(|operand| operand.numeric(self.engine.config.dialect).into()),
            ColumnSource::SpentHours => Some(self.spent_hours()),
            _ => None,
        }
    }
}

/// Resolved ordering of one query.
pub(crate) struct Ordering {
    /// Group key expression and the expressions groups are ordered by.
    pub group: Option<(SimpleExpr, Vec<(SimpleExpr, Order)>)>,
    pub order: Vec<(SimpleExpr, Order)>,
}

/// Group column first, then the sort criteria, then `id DESC` as the final
/// tie-breaker unless `id` is already a criterion.
pub(crate) fn ordering(
    exprs: &mut ColumnExprs<'_, '_>,
    query: &Query,
    columns: &IndexMap<String, QueryColumn>,
) -> Ordering {
    let criteria = query.sort_criteria();
    let group_column = query
        .group_by
        .as_deref()
        .and_then(|name| columns.get(name))
        .filter(|c| c.groupable);

    let mut order = Vec::new();
    let group = group_column.and_then(|column| {
        let direction = criteria
            .iter()
            .find(|c| c.field == column.name)
            .map(|c| c.direction)
            .or(column.default_order)
            .unwrap_or_default();
        let key = exprs.group_key(column)?;
        let group_order: Vec<(SimpleExpr, Order)> = exprs
            .sort_exprs(column)
            .into_iter()
            .map(|e| (e, to_order(direction)))
            .collect();
        Some((key, group_order))
    });
    if let Some((_, group_order)) = &group {
        order.extend(group_order.iter().cloned());
    }

    for criterion in criteria {
        match columns.get(&criterion.field) {
            Some(column) if column.sortable => {
                let direction = to_order(criterion.direction);
                order.extend(exprs.sort_exprs(column).into_iter().map(|e| (e, direction.clone())));
            }
            _ => debug!(field = %criterion.field, "sort key not available, skipped"),
        }
    }

    if !criteria.iter().any(|c| c.field == "id") {
        order.push((exprs.col(exprs.table(), "id"), Order::Desc));
    }

    Ordering { group, order }
}
