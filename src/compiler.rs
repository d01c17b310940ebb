//! Predicate compiler: folds validated clauses into one condition plus the
//! joins it needs, then seals it with the visibility predicate.

use sea_query::{Alias, Cond, Expr, JoinType, SelectStatement, SimpleExpr};

use crate::catalog::{CustomField, Customized, Visibility, VIEW_PRIVATE_NOTES};
use crate::config::{EngineConfig, PrivateNotesPolicy};
use crate::context::{Actor, EvalContext};
use crate::engine::QueryEngine;
use crate::model::{Association, CustomFieldId, EntityKind, ProjectId, RelationType, ValueKind};
use crate::operators::{field_condition, Binding, DateEnv, Operand, Operator};
use crate::query::Query;
use crate::registry::{FilterTarget, SpecialFilter, SpecialValue};
use crate::storage::Dialect;
use crate::validator::ActiveClause;

fn never() -> SimpleExpr {
    Expr::val(1).eq(0)
}

fn always() -> SimpleExpr {
    Expr::val(1).eq(1)
}

fn negate(expr: SimpleExpr) -> SimpleExpr {
    Cond::all().not().add(expr).into()
}

fn column(table: &str, name: &str) -> Expr {
    Expr::col((Alias::new(table), Alias::new(name)))
}

fn ids(values: &[String]) -> Vec<i64> {
    values
        .iter()
        .filter_map(|v| v.trim().parse::<i64>().ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    table: String,
    alias: String,
    on: SimpleExpr,
}

/// Left joins required by a statement. Association joins are shared by
/// alias; every custom value join gets an alias of its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinSet {
    joins: Vec<Join>,
    counter: usize,
}

impl JoinSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh alias for a join or subquery table.
    pub fn next_alias(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}_{}", self.counter)
    }

    pub fn association(
        &mut self,
        config: &EngineConfig,
        owner: &str,
        association: Association,
    ) -> &'static str {
        let alias = association.alias();
        if !self.contains(alias) {
            self.joins.push(Join {
                table: config.table_name(association.table()),
                alias: alias.to_string(),
                on: column(owner, association.foreign_key())
                    .equals((Alias::new(alias), Alias::new("id"))),
            });
        }
        alias
    }

    /// Joins the value row of `field_id` for the record `owner.id`.
    pub fn custom_value(
        &mut self,
        config: &EngineConfig,
        customized_type: &str,
        owner: &str,
        field_id: CustomFieldId,
    ) -> String {
        let alias = self.next_alias("cv");
        let on = Cond::all()
            .add(column(&alias, "customized_type").eq(customized_type))
            .add(column(&alias, "customized_id").equals((Alias::new(owner), Alias::new("id"))))
            .add(column(&alias, "custom_field_id").eq(field_id));
        self.joins.push(Join {
            table: config.table_name("custom_values"),
            alias: alias.clone(),
            on: on.into(),
        });
        alias
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.joins.iter().map(|j| j.alias.as_str())
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn apply(&self, select: &mut SelectStatement) {
        self.apply_except(&JoinSet::new(), select);
    }

    /// Applies the joins not already present in `applied`.
    pub fn apply_except(&self, applied: &JoinSet, select: &mut SelectStatement) {
        for join in self.joins.iter().filter(|j| !applied.contains(&j.alias)) {
            select.join_as(
                JoinType::LeftJoin,
                Alias::new(&join.table),
                Alias::new(&join.alias),
                join.on.clone(),
            );
        }
    }
}

/// One immutable predicate: the filter condition, its joins and the
/// visibility restriction, sealed to the actor, kind and dialect it was
/// compiled for.
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    kind: EntityKind,
    actor: Actor,
    dialect: Dialect,
    filter: Option<SimpleExpr>,
    joins: JoinSet,
    visibility: Option<Visibility>,
}

impl CompiledPredicate {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn joins(&self) -> &JoinSet {
        &self.joins
    }

    /// The filter part alone, without visibility.
    pub fn filter(&self) -> Option<&SimpleExpr> {
        self.filter.as_ref()
    }

    pub fn visibility(&self) -> Option<&Visibility> {
        self.visibility.as_ref()
    }

    pub fn is_sealed_for(&self, actor: &Actor, kind: EntityKind, dialect: Dialect) -> bool {
        self.actor == *actor && self.kind == kind && self.dialect == dialect
    }

    /// Filter AND visibility. Never empty: with nothing to restrict this is
    /// an explicit `1 = 1`.
    pub fn condition(&self) -> SimpleExpr {
        let mut cond = Cond::all();
        if let Some(filter) = &self.filter {
            cond = cond.add(filter.clone());
        }
        if let Some(Visibility::Restricted(restriction)) = &self.visibility {
            cond = cond.add(restriction.clone());
        }
        if cond.is_empty() {
            return always();
        }
        cond.into()
    }

    /// `FROM <table> AS <kind> LEFT JOIN ... WHERE <condition>` with no
    /// selected expressions yet.
    pub fn select(&self, config: &EngineConfig) -> SelectStatement {
        self.select_with(config, &JoinSet::new())
    }

    /// Same as [`CompiledPredicate::select`], adding the joins of `extra`
    /// that are not part of the predicate.
    pub fn select_with(&self, config: &EngineConfig, extra: &JoinSet) -> SelectStatement {
        let table = self.kind.table();
        let mut select = SelectStatement::new();
        select.from_as(Alias::new(config.table_name(table)), Alias::new(table));
        self.joins.apply(&mut select);
        extra.apply_except(&self.joins, &mut select);
        select.and_where(self.condition());
        select
    }

    #[cfg(test)]
    pub(crate) fn without_visibility(mut self) -> Self {
        self.visibility = None;
        self
    }
}

struct PredicateCompiler<'e, 'a> {
    engine: &'e QueryEngine<'a>,
    actor: &'e Actor,
    kind: EntityKind,
    env: DateEnv,
    joins: JoinSet,
}

impl<'e, 'a> PredicateCompiler<'e, 'a> {
    fn table(&self) -> &'static str {
        self.kind.table()
    }

    fn col(&self, name: &str) -> Expr {
        column(self.table(), name)
    }

    fn physical(&self, logical: &str) -> Alias {
        Alias::new(self.engine.config.table_name(logical))
    }

    fn dialect(&self) -> Dialect {
        self.engine.config.dialect
    }

    fn condition(&self, op: Operator, values: &[String], operand: &Operand) -> SimpleExpr {
        field_condition(op, values, operand, &self.env, self.dialect())
    }

    /// Substitutes `me`, `mine` and `bookmarks`, and splits id lists.
    fn resolve_values(&self, clause: &ActiveClause<'_>) -> Vec<String> {
        let definition = clause.definition;
        let offers = |special: SpecialValue| definition.special_values.contains(&special);
        let identity = self.engine.identity;
        let mut out = Vec::new();
        for value in &clause.values {
            match value.as_str() {
                "me" if offers(SpecialValue::Me) => {
                    out.push(self.actor.me_value());
                    if let (true, Some(id)) = (definition.me_includes_groups, self.actor.id) {
                        out.extend(identity.group_ids(id).iter().map(ToString::to_string));
                    }
                }
                "mine" if offers(SpecialValue::Mine) => {
                    if let Some(id) = self.actor.id {
                        out.extend(identity.member_project_ids(id).iter().map(ToString::to_string));
                    }
                }
                "bookmarks" if offers(SpecialValue::Bookmarks) => {
                    if let Some(id) = self.actor.id {
                        out.extend(
                            identity
                                .bookmarked_project_ids(id)
                                .iter()
                                .map(ToString::to_string),
                        );
                    }
                }
                other => out.push(other.to_string()),
            }
        }
        let id_list = matches!(
            definition.value_kind,
            ValueKind::Integer | ValueKind::Relation | ValueKind::Tree
        ) && matches!(clause.operator, Operator::Equals | Operator::NotEquals);
        if id_list {
            out = out
                .iter()
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
        }
        out
    }

    /// Restricts the query to the anchor project and, depending on the
    /// subproject settings, its descendants.
    fn project_statement(&self, query: &Query, clauses: &[ActiveClause<'_>]) -> Option<SimpleExpr> {
        if self.kind != EntityKind::Issue {
            return None;
        }
        let anchor = query.project_id?;
        let metadata = self.engine.metadata;
        let descendants = || -> Vec<ProjectId> {
            metadata
                .descendants(anchor)
                .into_iter()
                .filter(|id| metadata.project(*id).is_some_and(|p| !p.is_archived()))
                .collect()
        };
        let subproject = clauses
            .iter()
            .find(|c| c.definition.target == FilterTarget::Special(SpecialFilter::Subproject));
        let mut project_ids = vec![anchor];
        match subproject {
            Some(clause) => match clause.operator {
                Operator::Equals => project_ids.extend(ids(&clause.values)),
                Operator::Absent => {}
                _ => project_ids.extend(descendants()),
            },
            None => {
                let include = query
                    .include_subprojects
                    .unwrap_or(self.engine.config.display_subprojects_issues);
                if include {
                    project_ids.extend(descendants());
                }
            }
        }
        Some(self.col("project_id").is_in(project_ids))
    }

    fn clause(&mut self, clause: &ActiveClause<'_>) -> Option<SimpleExpr> {
        let values = self.resolve_values(clause);
        let op = clause.operator;
        let kind = clause.definition.value_kind;
        let expr = match &clause.definition.target {
            FilterTarget::Column(name) => {
                let operand = Operand::native(self.table(), name, kind);
                self.condition(op, &values, &operand)
            }
            FilterTarget::AssociationColumn {
                association,
                column: name,
            } => {
                let alias =
                    self.joins
                        .association(self.engine.config, self.table(), *association);
                let mut operand = Operand::native(alias, name, kind);
                if kind == ValueKind::List {
                    operand = operand.with_binding(Binding::Text);
                }
                self.condition(op, &values, &operand)
            }
            FilterTarget::CustomField(id) => self.custom_field(*id, op, &values),
            FilterTarget::AssociationCustomField {
                association,
                field_id,
            } => self.association_custom_field(*association, *field_id, op, &values),
            FilterTarget::ReferencedColumn {
                field_id,
                table,
                column: name,
            } => self.referenced_column(*field_id, table, name, kind, op, &values),
            FilterTarget::ReferencedCustomField {
                field_id,
                sub_field_id,
            } => self.referenced_custom_field(*field_id, *sub_field_id, op, &values),
            FilterTarget::Relation(relation) => self.relation(*relation, op, &values),
            FilterTarget::Special(SpecialFilter::Subproject) => return None,
            FilterTarget::Special(special) => self.special(*special, op, &values),
        };
        Some(expr)
    }

    /// Where a custom field of the queried item applies: its projects and
    /// trackers. `None` when it applies everywhere.
    fn applicability(&self, cf: &CustomField) -> Option<SimpleExpr> {
        if self.kind != EntityKind::Issue || cf.customized != Customized::Issue {
            return None;
        }
        let mut cond = Cond::all();
        if !cf.is_for_all {
            cond = cond.add(if cf.project_ids.is_empty() {
                never()
            } else {
                self.col("project_id").is_in(cf.project_ids.iter().copied())
            });
        }
        if !cf.tracker_ids.is_empty() {
            cond = cond.add(self.col("tracker_id").is_in(cf.tracker_ids.iter().copied()));
        }
        (!cond.is_empty()).then(|| cond.into())
    }

    /// `key [NOT] IN (SELECT customized_id FROM custom_values WHERE ...)`
    /// for multi-valued fields. Negative operators test the positive form.
    fn multi_value_condition(
        &mut self,
        key: Expr,
        cf: &CustomField,
        op: Operator,
        values: &[String],
    ) -> SimpleExpr {
        let (positive, negated) = match op {
            Operator::NotEquals => (Operator::Equals, true),
            Operator::NotContains => (Operator::Contains, true),
            Operator::Absent => (Operator::Any, true),
            other => (other, false),
        };
        let alias = self.joins.next_alias("cv");
        let operand = Operand::custom_value(&alias, cf.value_kind());
        let mut sub = SelectStatement::new();
        sub.column((Alias::new(&alias), Alias::new("customized_id")))
            .from_as(self.physical("custom_values"), Alias::new(&alias))
            .and_where(column(&alias, "customized_type").eq(cf.customized.customized_type()))
            .and_where(column(&alias, "custom_field_id").eq(cf.id))
            .and_where(self.condition(positive, values, &operand));
        if negated {
            key.not_in_subquery(sub)
        } else {
            key.in_subquery(sub)
        }
    }

    fn custom_field(&mut self, id: CustomFieldId, op: Operator, values: &[String]) -> SimpleExpr {
        let Some(cf) = self.engine.metadata.custom_field(id) else {
            return never();
        };
        let applicable = self.applicability(cf);
        let negative = matches!(op, Operator::NotEquals | Operator::NotContains);

        if cf.multiple {
            let cond = self.multi_value_condition(self.col("id"), cf, op, values);
            return match (applicable, negative) {
                (None, _) => cond,
                (Some(applicable), true) => Cond::any().add(cond).add(negate(applicable)).into(),
                (Some(applicable), false) => Cond::all().add(applicable).add(cond).into(),
            };
        }

        let alias = self.joins.custom_value(
            self.engine.config,
            cf.customized.customized_type(),
            self.table(),
            cf.id,
        );
        let operand = Operand::custom_value(&alias, cf.value_kind());
        if negative {
            let positive = if op == Operator::NotEquals {
                Operator::Equals
            } else {
                Operator::Contains
            };
            let mut matched = Cond::all();
            if let Some(applicable) = applicable {
                matched = matched.add(applicable);
            }
            matched = matched.add(self.condition(positive, values, &operand));
            return Cond::any()
                .add(operand.col().is_null())
                .add(negate(matched.into()))
                .into();
        }
        let cond = self.condition(op, values, &operand);
        match applicable {
            Some(applicable) => Cond::all().add(applicable).add(cond).into(),
            None => cond,
        }
    }

    fn association_custom_field(
        &mut self,
        association: Association,
        field_id: CustomFieldId,
        op: Operator,
        values: &[String],
    ) -> SimpleExpr {
        let Some(cf) = self.engine.metadata.custom_field(field_id) else {
            return never();
        };
        let foreign_key = association.foreign_key();
        if cf.multiple {
            let cond = self.multi_value_condition(self.col(foreign_key), cf, op, values);
            return match op {
                Operator::NotEquals | Operator::NotContains | Operator::Absent => Cond::any()
                    .add(self.col(foreign_key).is_null())
                    .add(cond)
                    .into(),
                _ => cond,
            };
        }
        let owner = self
            .joins
            .association(self.engine.config, self.table(), association);
        let alias = self.joins.custom_value(
            self.engine.config,
            cf.customized.customized_type(),
            owner,
            cf.id,
        );
        self.condition(op, values, &Operand::custom_value(&alias, cf.value_kind()))
    }

    /// Items whose reference field `field_id` points at a record selected
    /// by `inner`. `inner` yields the record ids as text.
    fn referencing_items(&mut self, field_id: CustomFieldId, inner: SelectStatement) -> SimpleExpr {
        let alias = self.joins.next_alias("cvr");
        let mut sub = SelectStatement::new();
        sub.column((Alias::new(&alias), Alias::new("customized_id")))
            .from_as(self.physical("custom_values"), Alias::new(&alias))
            .and_where(column(&alias, "customized_type").eq(self.kind.customized_type()))
            .and_where(column(&alias, "custom_field_id").eq(field_id))
            .and_where(column(&alias, "value").in_subquery(inner));
        self.col("id").in_subquery(sub)
    }

    fn referenced_column(
        &mut self,
        field_id: CustomFieldId,
        table: &str,
        name: &str,
        kind: ValueKind,
        op: Operator,
        values: &[String],
    ) -> SimpleExpr {
        let alias = self.joins.next_alias("ref");
        let mut operand = Operand::native(&alias, name, kind);
        if kind == ValueKind::List {
            operand = operand.with_binding(Binding::Text);
        }
        let mut inner = SelectStatement::new();
        inner
            .expr(Expr::cust(format!(r#"CAST("{alias}"."id" AS text)"#)))
            .from_as(self.physical(table), Alias::new(&alias))
            .and_where(self.condition(op, values, &operand));
        self.referencing_items(field_id, inner)
    }

    fn referenced_custom_field(
        &mut self,
        field_id: CustomFieldId,
        sub_field_id: CustomFieldId,
        op: Operator,
        values: &[String],
    ) -> SimpleExpr {
        let Some(sub_field) = self.engine.metadata.custom_field(sub_field_id) else {
            return never();
        };
        let alias = self.joins.next_alias("cvs");
        let operand = Operand::custom_value(&alias, sub_field.value_kind());
        let mut inner = SelectStatement::new();
        inner
            .expr(Expr::cust(format!(
                r#"CAST("{alias}"."customized_id" AS text)"#
            )))
            .from_as(self.physical("custom_values"), Alias::new(&alias))
            .and_where(
                column(&alias, "customized_type").eq(sub_field.customized.customized_type()),
            )
            .and_where(column(&alias, "custom_field_id").eq(sub_field.id))
            .and_where(self.condition(op, values, &operand));
        self.referencing_items(field_id, inner)
    }

    /// `SELECT id FROM issue_statuses WHERE is_closed = <closed>`
    fn statuses(&mut self, closed: bool) -> SelectStatement {
        let alias = self.joins.next_alias("st");
        let mut sub = SelectStatement::new();
        sub.column((Alias::new(&alias), Alias::new("id")))
            .from_as(self.physical("issue_statuses"), Alias::new(&alias))
            .and_where(column(&alias, "is_closed").eq(closed));
        sub
    }

    fn relation(&mut self, relation: RelationType, op: Operator, values: &[String]) -> SimpleExpr {
        let (from, to) = if relation.is_reverse() {
            ("issue_to_id", "issue_from_id")
        } else {
            ("issue_from_id", "issue_to_id")
        };
        let forward = self.relation_direction(relation, from, to, op, values);
        if !relation.is_symmetric() {
            return forward;
        }
        let backward = self.relation_direction(relation, to, from, op, values);
        if op.is_negative() {
            Cond::all().add(forward).add(backward).into()
        } else {
            Cond::any().add(forward).add(backward).into()
        }
    }

    /// Items on the `join_col` side of stored edges whose other side
    /// (`target_col`) satisfies the operator.
    fn relation_direction(
        &mut self,
        relation: RelationType,
        join_col: &str,
        target_col: &str,
        op: Operator,
        values: &[String],
    ) -> SimpleExpr {
        let alias = self.joins.next_alias("ir");
        let mut sub = SelectStatement::new();
        sub.column((Alias::new(&alias), Alias::new(join_col)))
            .from_as(self.physical("issue_relations"), Alias::new(&alias))
            .and_where(column(&alias, "relation_type").eq(relation.stored_type()));

        let negated = match op {
            Operator::Equals | Operator::NotEquals => {
                let targets = ids(values);
                if targets.is_empty() {
                    return if op == Operator::Equals { never() } else { always() };
                }
                sub.and_where(column(&alias, target_col).is_in(targets));
                op == Operator::NotEquals
            }
            Operator::Any => false,
            Operator::Absent => true,
            Operator::RelatedToProject
            | Operator::RelatedOutsideProject
            | Operator::NotRelatedToProject => {
                let Some(project) = ids(values).first().copied() else {
                    return never();
                };
                let related = self.joins.next_alias("relissues");
                let project_col = column(&related, "project_id");
                let in_project = if op == Operator::RelatedOutsideProject {
                    project_col.ne(project)
                } else {
                    project_col.eq(project)
                };
                sub.join_as(
                    JoinType::InnerJoin,
                    self.physical("issues"),
                    Alias::new(&related),
                    Cond::all()
                        .add(column(&related, "id").equals((Alias::new(&alias), Alias::new(target_col))))
                        .add(in_project),
                );
                op == Operator::NotRelatedToProject
            }
            Operator::AnyOpen | Operator::NoneOpen => {
                let related = self.joins.next_alias("relissues");
                let open = self.statuses(false);
                sub.join_as(
                    JoinType::InnerJoin,
                    self.physical("issues"),
                    Alias::new(&related),
                    Cond::all()
                        .add(column(&related, "id").equals((Alias::new(&alias), Alias::new(target_col))))
                        .add(column(&related, "status_id").in_subquery(open)),
                );
                op == Operator::NoneOpen
            }
            _ => return never(),
        };
        if negated {
            self.col("id").not_in_subquery(sub)
        } else {
            self.col("id").in_subquery(sub)
        }
    }

    /// Journals visibility for journal-author filters.
    fn private_notes_condition(&self, journals: &str) -> Option<SimpleExpr> {
        if self.actor.admin || self.engine.config.private_notes == PrivateNotesPolicy::Counted {
            return None;
        }
        let allowed = self
            .engine
            .security
            .allowed_project_ids(self.actor, VIEW_PRIVATE_NOTES);
        let in_allowed = if allowed.is_empty() {
            never()
        } else {
            self.col("project_id").is_in(allowed)
        };
        Some(
            Cond::any()
                .add(column(journals, "private_notes").eq(false))
                .add(in_allowed)
                .into(),
        )
    }

    fn journals(&mut self, prefix: &str) -> (String, SelectStatement) {
        let alias = self.joins.next_alias(prefix);
        let mut sub = SelectStatement::new();
        sub.from_as(self.physical("journals"), Alias::new(&alias))
            .and_where(column(&alias, "journalized_type").eq(self.kind.customized_type()));
        if let Some(policy) = self.private_notes_condition(&alias) {
            sub.and_where(policy);
        }
        (alias, sub)
    }

    fn special(&mut self, special: SpecialFilter, op: Operator, values: &[String]) -> SimpleExpr {
        match special {
            SpecialFilter::Status => match op {
                Operator::Open => {
                    let open = self.statuses(false);
                    self.col("status_id").in_subquery(open)
                }
                Operator::Closed => {
                    let closed = self.statuses(true);
                    self.col("status_id").in_subquery(closed)
                }
                _ => {
                    let operand = Operand::native(self.table(), "status_id", ValueKind::List);
                    self.condition(op, values, &operand)
                }
            },
            SpecialFilter::Watcher => {
                let users = ids(values);
                if users.is_empty() {
                    return if op == Operator::Equals { never() } else { always() };
                }
                let alias = self.joins.next_alias("w");
                let mut sub = SelectStatement::new();
                sub.column((Alias::new(&alias), Alias::new("watchable_id")))
                    .from_as(self.physical("watchers"), Alias::new(&alias))
                    .and_where(column(&alias, "watchable_type").eq(self.kind.customized_type()))
                    .and_where(column(&alias, "user_id").is_in(users));
                self.membership(op == Operator::NotEquals, sub)
            }
            SpecialFilter::MemberOfGroup => {
                let groups = self.engine.metadata.groups();
                let members: Vec<String> = groups
                    .iter()
                    .filter(|g| {
                        matches!(op, Operator::Any | Operator::Absent)
                            || values.contains(&g.id.to_string())
                    })
                    .flat_map(|g| g.user_ids.iter().copied().chain(std::iter::once(g.id)))
                    .map(|id| id.to_string())
                    .collect();
                let op = match op {
                    Operator::Any => Operator::Equals,
                    Operator::Absent => Operator::NotEquals,
                    other => other,
                };
                let operand = Operand::native(self.table(), "assigned_to_id", ValueKind::List);
                self.condition(op, &members, &operand)
            }
            SpecialFilter::AssignedToRole => {
                let roles: Vec<i64> = match op {
                    Operator::Any | Operator::Absent => self
                        .engine
                        .metadata
                        .roles()
                        .iter()
                        .filter(|r| r.builtin.is_none())
                        .map(|r| r.id)
                        .collect(),
                    _ => ids(values),
                };
                let positive = matches!(op, Operator::Equals | Operator::Any);
                if roles.is_empty() {
                    return if positive { never() } else { always() };
                }
                let members = self.joins.next_alias("m");
                let member_roles = self.joins.next_alias("mr");
                let mut sub = SelectStatement::new();
                sub.expr(Expr::val(1))
                    .from_as(self.physical("members"), Alias::new(&members))
                    .join_as(
                        JoinType::InnerJoin,
                        self.physical("member_roles"),
                        Alias::new(&member_roles),
                        column(&member_roles, "member_id")
                            .equals((Alias::new(&members), Alias::new("id"))),
                    )
                    .and_where(
                        column(&members, "user_id")
                            .equals((Alias::new(self.table()), Alias::new("assigned_to_id"))),
                    )
                    .and_where(
                        column(&members, "project_id")
                            .equals((Alias::new(self.table()), Alias::new("project_id"))),
                    )
                    .and_where(column(&member_roles, "role_id").is_in(roles));
                let exists = Expr::exists(sub);
                if positive {
                    exists
                } else {
                    negate(exists)
                }
            }
            SpecialFilter::Child => {
                let alias = self.joins.next_alias("children");
                let mut sub = SelectStatement::new();
                sub.column((Alias::new(&alias), Alias::new("parent_id")))
                    .from_as(self.physical(self.table()), Alias::new(&alias));
                match op {
                    Operator::Equals => {
                        let children = ids(values);
                        if children.is_empty() {
                            return never();
                        }
                        sub.and_where(column(&alias, "id").is_in(children));
                    }
                    _ => {
                        sub.and_where(column(&alias, "parent_id").is_not_null());
                    }
                }
                self.membership(op == Operator::Absent, sub)
            }
            SpecialFilter::Attachment => {
                let (positive, negated) = match op {
                    Operator::NotContains => (Operator::Contains, true),
                    Operator::Absent => (Operator::Any, true),
                    other => (other, false),
                };
                let alias = self.joins.next_alias("att");
                let operand = Operand::native(&alias, "filename", ValueKind::Text);
                let mut sub = SelectStatement::new();
                sub.column((Alias::new(&alias), Alias::new("container_id")))
                    .from_as(self.physical("attachments"), Alias::new(&alias))
                    .and_where(column(&alias, "container_type").eq(self.kind.customized_type()))
                    .and_where(self.condition(positive, values, &operand));
                self.membership(negated, sub)
            }
            SpecialFilter::UpdatedBy => {
                let users = ids(values);
                if users.is_empty() {
                    return if op == Operator::Equals { never() } else { always() };
                }
                let (alias, mut sub) = self.journals("j");
                sub.column((Alias::new(&alias), Alias::new("journalized_id")))
                    .and_where(column(&alias, "user_id").is_in(users));
                self.membership(op == Operator::NotEquals, sub)
            }
            SpecialFilter::LastUpdatedBy => {
                let users = ids(values);
                if users.is_empty() {
                    return if op == Operator::Equals { never() } else { always() };
                }
                let (last, mut latest) = self.journals("last_journals");
                let alias = self.joins.next_alias("j");
                latest
                    .expr(column(&last, "id").max())
                    .and_where(
                        column(&last, "journalized_id")
                            .equals((Alias::new(&alias), Alias::new("journalized_id"))),
                    );
                let mut sub = SelectStatement::new();
                sub.column((Alias::new(&alias), Alias::new("journalized_id")))
                    .from_as(self.physical("journals"), Alias::new(&alias))
                    .and_where(column(&alias, "journalized_type").eq(self.kind.customized_type()))
                    .and_where(column(&alias, "user_id").is_in(users))
                    .and_where(column(&alias, "id").in_subquery(latest));
                self.membership(op == Operator::NotEquals, sub)
            }
            SpecialFilter::IssueId => {
                let operand = Operand::native(self.table(), "id", ValueKind::Integer);
                self.condition(op, values, &operand)
            }
            SpecialFilter::Subproject => always(),
        }
    }

    /// `id [NOT] IN (sub)`
    fn membership(&self, negated: bool, sub: SelectStatement) -> SimpleExpr {
        if negated {
            self.col("id").not_in_subquery(sub)
        } else {
            self.col("id").in_subquery(sub)
        }
    }
}

/// Compiles validated clauses of `query` for the actor of `ctx`. The
/// visibility predicate is always attached.
pub(crate) fn compile_predicate(
    engine: &QueryEngine<'_>,
    query: &Query,
    ctx: &EvalContext,
    clauses: &[ActiveClause<'_>],
) -> CompiledPredicate {
    let mut compiler = PredicateCompiler {
        engine,
        actor: &ctx.actor,
        kind: query.kind,
        env: engine.date_env(ctx),
        joins: JoinSet::new(),
    };

    let mut cond = Cond::all();
    if let Some(projects) = compiler.project_statement(query, clauses) {
        cond = cond.add(projects);
    }
    for clause in clauses {
        if let Some(expr) = compiler.clause(clause) {
            cond = cond.add(expr);
        }
    }

    let visibility = engine
        .security
        .visibility_predicate(&ctx.actor, query.kind, query.project_id);

    CompiledPredicate {
        kind: query.kind,
        actor: ctx.actor.clone(),
        dialect: engine.config.dialect,
        filter: (!cond.is_empty()).then(|| cond.into()),
        joins: compiler.joins,
        visibility: Some(visibility),
    }
}
