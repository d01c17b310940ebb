//! The query definition: filters, sort, grouping, columns and totals.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ast::QueryParams;
use crate::catalog::{SecurityProvider, VIEW_ISSUES};
use crate::context::Actor;
use crate::model::{EntityKind, ProjectId, RoleId, UserId};
use crate::operators::Operator;
use crate::registry::{FilterDefinition, QueryColumn};

/// Maximum number of sort keys kept on a query.
pub const MAX_SORT_CRITERIA: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub field: String,
    pub direction: SortDirection,
}

/// Who may see a saved query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryVisibility {
    #[default]
    Public,
    Private {
        owner: Option<UserId>,
    },
    Roles {
        role_ids: Vec<RoleId>,
    },
}

/// Where a clause came from. Stale stored clauses degrade silently,
/// explicitly set ones are validated strictly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClauseOrigin {
    #[default]
    Stored,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(skip)]
    pub origin: ClauseOrigin,
}

impl FilterClause {
    pub fn operator(&self) -> Option<Operator> {
        Operator::from_symbol(&self.operator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub name: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// `None` falls back to the configured default.
    #[serde(default)]
    pub include_subprojects: Option<bool>,
    #[serde(default)]
    pub visibility: QueryVisibility,
    #[serde(default)]
    pub filters: IndexMap<String, FilterClause>,
    #[serde(default)]
    sort_criteria: Vec<SortCriterion>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub column_names: Vec<String>,
    #[serde(default)]
    pub totalable_names: Vec<String>,
}

impl Query {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            name: String::new(),
            kind,
            project_id: None,
            include_subprojects: None,
            visibility: QueryVisibility::Public,
            filters: IndexMap::new(),
            sort_criteria: Vec::new(),
            group_by: None,
            column_names: Vec::new(),
            totalable_names: Vec::new(),
        }
    }

    /// A fresh query carrying the default filter of its kind.
    pub fn with_default_filters(kind: EntityKind) -> Self {
        let mut query = Self::new(kind);
        match kind {
            EntityKind::Issue => query.add_filter("status_id", "o", Vec::<String>::new()),
            EntityKind::Project => query.add_filter("status", "=", ["1"]),
        }
        query
    }

    pub fn in_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Sets a clause through the direct API; unknown fields are errors.
    pub fn add_filter<I, S>(&mut self, field: &str, operator: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.insert(
            field.to_string(),
            FilterClause {
                operator: operator.to_string(),
                values: values.into_iter().map(Into::into).collect(),
                origin: ClauseOrigin::Explicit,
            },
        );
    }

    pub fn remove_filter(&mut self, field: &str) -> Option<FilterClause> {
        self.filters.shift_remove(field)
    }

    pub fn has_filter(&self, field: &str) -> bool {
        self.filters.contains_key(field)
    }

    pub fn operator_for(&self, field: &str) -> Option<Operator> {
        self.filters.get(field).and_then(FilterClause::operator)
    }

    pub fn values_for(&self, field: &str) -> &[String] {
        self.filters
            .get(field)
            .map(|c| c.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn sort_criteria(&self) -> &[SortCriterion] {
        &self.sort_criteria
    }

    /// Keeps the first occurrence of each non-blank key, up to three keys.
    pub fn set_sort_criteria<I, S>(&mut self, criteria: I)
    where
        I: IntoIterator<Item = (S, SortDirection)>,
        S: Into<String>,
    {
        let mut kept: Vec<SortCriterion> = Vec::new();
        for (field, direction) in criteria {
            let field: String = field.into();
            let field = field.trim();
            if field.is_empty() || kept.iter().any(|c| c.field == field) {
                debug!(field, "pruned sort key");
                continue;
            }
            if kept.len() == MAX_SORT_CRITERIA {
                debug!(field, "sort key beyond limit dropped");
                continue;
            }
            kept.push(SortCriterion {
                field: field.to_string(),
                direction,
            });
        }
        self.sort_criteria = kept;
    }

    pub fn is_grouped(&self) -> bool {
        self.group_by.as_deref().is_some_and(|g| !g.is_empty())
    }

    /// Rebuilds filters, sort, grouping, columns and totals from request
    /// parameters. Anything unknown to `filters`/`columns` is dropped.
    pub fn apply_params(
        &mut self,
        params: &QueryParams,
        filters: &IndexMap<String, FilterDefinition>,
        columns: &IndexMap<String, QueryColumn>,
    ) {
        if params.set_filter || !params.fields.is_empty() || !params.short_filters.is_empty() {
            self.filters.clear();
            for field in &params.fields {
                if field.is_empty() {
                    continue;
                }
                let Some(definition) = filters.get(field) else {
                    debug!(field = %field, "unknown filter in parameters dropped");
                    continue;
                };
                let operator = params
                    .operators
                    .get(field)
                    .map(String::as_str)
                    .unwrap_or("=");
                let allowed = Operator::from_symbol(operator)
                    .is_some_and(|op| definition.operators.contains(op));
                if !allowed {
                    debug!(field = %field, operator, "unknown operator in parameters dropped");
                    continue;
                }
                let values = params.values.get(field).cloned().unwrap_or_default();
                self.insert_stored(field, operator, values);
            }
            for (field, expression) in &params.short_filters {
                let Some(definition) = filters.get(field) else {
                    continue;
                };
                let operator = definition
                    .operators
                    .operators()
                    .iter()
                    .map(|op| op.symbol())
                    .filter(|symbol| expression.starts_with(symbol))
                    .max_by_key(|symbol| symbol.len())
                    .unwrap_or("=");
                let rest = expression.strip_prefix(operator).unwrap_or(expression);
                let values = if rest.is_empty() {
                    Vec::new()
                } else {
                    rest.split('|').map(str::to_string).collect()
                };
                self.insert_stored(field, operator, values);
            }
        }

        if let Some(sort) = &params.sort {
            let criteria: Vec<(String, SortDirection)> = sort
                .split(',')
                .filter_map(|part| {
                    let mut pieces = part.splitn(2, ':');
                    let field = pieces.next()?.trim().to_string();
                    let direction = pieces.next().map(SortDirection::parse).unwrap_or_default();
                    match columns.get(&field) {
                        Some(column) if column.sortable => Some((field, direction)),
                        _ => {
                            debug!(field = %field, "unsortable key in parameters dropped");
                            None
                        }
                    }
                })
                .collect();
            self.set_sort_criteria(criteria);
        }

        if let Some(group_by) = &params.group_by {
            if group_by.is_empty() {
                self.group_by = None;
            } else if columns.get(group_by).is_some_and(|c| c.groupable) {
                self.group_by = Some(group_by.clone());
            } else {
                warn!(group_by = %group_by, "group key is not groupable, ignored");
                self.group_by = None;
            }
        }

        if !params.columns.is_empty() {
            self.column_names = params
                .columns
                .iter()
                .filter(|name| columns.contains_key(name.as_str()))
                .cloned()
                .collect();
        }

        if !params.totals.is_empty() {
            self.totalable_names = params
                .totals
                .iter()
                .filter(|name| columns.get(name.as_str()).is_some_and(|c| c.totalable))
                .cloned()
                .collect();
        }
    }

    fn insert_stored(&mut self, field: &str, operator: &str, values: Vec<String>) {
        self.filters.insert(
            field.to_string(),
            FilterClause {
                operator: operator.to_string(),
                values,
                origin: ClauseOrigin::Stored,
            },
        );
    }

    /// Flat parameter form, the inverse of [`Query::apply_params`].
    pub fn to_params(&self) -> String {
        let enc = |s: &str| urlencoding::encode(s).into_owned();
        let mut parts = vec!["set_filter=1".to_string()];
        if self.filters.is_empty() {
            parts.push("f[]=".to_string());
        }
        for (field, clause) in &self.filters {
            parts.push(format!("f[]={}", enc(field)));
            parts.push(format!("op[{}]={}", enc(field), enc(&clause.operator)));
            for value in &clause.values {
                parts.push(format!("v[{}][]={}", enc(field), enc(value)));
            }
        }
        if !self.sort_criteria.is_empty() {
            let sort = self
                .sort_criteria
                .iter()
                .map(|c| format!("{}:{}", c.field, c.direction.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("sort={}", enc(&sort)));
        }
        if let Some(group_by) = &self.group_by {
            parts.push(format!("group_by={}", enc(group_by)));
        }
        for column in &self.column_names {
            parts.push(format!("c[]={}", enc(column)));
        }
        for total in &self.totalable_names {
            parts.push(format!("t[]={}", enc(total)));
        }
        parts.join("&")
    }

    /// Whether `actor` may see this saved query.
    pub fn visible_to(&self, actor: &Actor, security: &dyn SecurityProvider) -> bool {
        if actor.admin {
            return true;
        }
        if let Some(project) = self.project_id {
            if !security.allowed_to(actor, VIEW_ISSUES, Some(project)) {
                return false;
            }
        }
        match &self.visibility {
            QueryVisibility::Public => true,
            QueryVisibility::Private { owner } => owner.is_some() && *owner == actor.id,
            QueryVisibility::Roles { role_ids } => {
                let held: Vec<RoleId> = match self.project_id {
                    Some(project) => security.role_ids_in(actor, project),
                    None => security
                        .allowed_project_ids(actor, VIEW_ISSUES)
                        .into_iter()
                        .flat_map(|p| security.role_ids_in(actor, p))
                        .collect(),
                };
                held.iter().any(|r| role_ids.contains(r))
            }
        }
    }
}
