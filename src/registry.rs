//! Filter type registry: available filters and columns per entity kind,
//! computed for one actor and anchor project.

use indexmap::IndexMap;
use serde::Serialize;

use crate::catalog::{CustomField, Customized, FieldFormat, SET_ISSUES_PRIVATE, VIEW_ISSUES, VIEW_TIME_ENTRIES};
use crate::context::Actor;
use crate::engine::QueryEngine;
use crate::model::{
    Association, CustomFieldId, EntityKind, FieldPath, OperatorSet, ProjectId, RelationType,
    ValueKind,
};
use crate::query::{Query, SortDirection};

/// Pseudo-values resolved per actor at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialValue {
    /// The acting user.
    Me,
    /// Projects the actor is a member of.
    Mine,
    Bookmarks,
}

impl SpecialValue {
    pub fn token(self) -> &'static str {
        match self {
            SpecialValue::Me => "me",
            SpecialValue::Mine => "mine",
            SpecialValue::Bookmarks => "bookmarks",
        }
    }
}

/// Filters that compile to dedicated subqueries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialFilter {
    Status,
    Subproject,
    Watcher,
    MemberOfGroup,
    AssignedToRole,
    Child,
    Attachment,
    UpdatedBy,
    LastUpdatedBy,
    IssueId,
}

/// What a filter definition compiles against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterTarget {
    /// Column of the queried table.
    Column(&'static str),
    /// Column of a joined association, e.g. `fixed_version.due_date`.
    AssociationColumn {
        association: Association,
        column: &'static str,
    },
    CustomField(CustomFieldId),
    /// Custom field of a joined association, e.g. `project.cf_3`.
    AssociationCustomField {
        association: Association,
        field_id: CustomFieldId,
    },
    /// Column of the record a reference custom field points at.
    ReferencedColumn {
        field_id: CustomFieldId,
        table: &'static str,
        column: &'static str,
    },
    /// Custom field of the record a reference custom field points at.
    ReferencedCustomField {
        field_id: CustomFieldId,
        sub_field_id: CustomFieldId,
    },
    Relation(RelationType),
    Special(SpecialFilter),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterValue {
    pub label: String,
    pub value: String,
}

impl FilterValue {
    fn new(label: impl Into<String>, value: impl ToString) -> Self {
        Self {
            label: label.into(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterDefinition {
    pub key: String,
    pub name: String,
    pub value_kind: ValueKind,
    pub operators: OperatorSet,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<FilterValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub special_values: Vec<SpecialValue>,
    /// `me` also matches the actor's groups.
    #[serde(skip)]
    pub me_includes_groups: bool,
    #[serde(skip)]
    pub path: FieldPath,
    #[serde(skip)]
    pub target: FilterTarget,
}

impl FilterDefinition {
    fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        value_kind: ValueKind,
        operators: OperatorSet,
        target: FilterTarget,
    ) -> Self {
        let key = key.into();
        let path = FieldPath::parse(&key).unwrap_or_else(|| FieldPath::Base(key.clone()));
        Self {
            key,
            name: name.into(),
            value_kind,
            operators,
            values: Vec::new(),
            special_values: Vec::new(),
            me_includes_groups: false,
            path,
            target,
        }
    }

    fn with_values(mut self, values: Vec<FilterValue>) -> Self {
        self.values = values;
        self
    }

    fn with_specials(mut self, specials: &[SpecialValue]) -> Self {
        self.special_values = specials.to_vec();
        self
    }
}

/// Where a column's sort, group and total expressions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// Column of the queried table.
    Own(&'static str),
    /// Joined association, grouped by its foreign key and sorted by `sort`.
    Association {
        association: Association,
        sort: &'static [&'static str],
    },
    /// A user reference, sorted by the configured name format.
    User(Association),
    CustomField(CustomFieldId),
    /// Sum of time entries.
    SpentHours,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryColumn {
    pub name: String,
    pub caption: String,
    pub source: ColumnSource,
    pub sortable: bool,
    pub groupable: bool,
    pub totalable: bool,
    pub default_order: Option<SortDirection>,
}

impl QueryColumn {
    fn new(name: &str, caption: &str, source: ColumnSource) -> Self {
        Self {
            name: name.to_string(),
            caption: caption.to_string(),
            source,
            sortable: true,
            groupable: false,
            totalable: false,
            default_order: None,
        }
    }

    fn groupable(mut self) -> Self {
        self.groupable = true;
        self
    }

    fn totalable(mut self) -> Self {
        self.totalable = true;
        self
    }

    fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    fn desc(mut self) -> Self {
        self.default_order = Some(SortDirection::Desc);
        self
    }
}

/// Core item attributes a tracker can switch off, keyed by filter/column name.
fn core_field_name(key: &str) -> Option<&'static str> {
    match key {
        "assigned_to_id" | "assigned_to" | "assigned_to.cf" => Some("assigned_to_id"),
        "category_id" | "category" => Some("category_id"),
        "fixed_version_id" | "fixed_version" => Some("fixed_version_id"),
        "parent_id" | "parent" => Some("parent_issue_id"),
        "start_date" => Some("start_date"),
        "due_date" => Some("due_date"),
        "estimated_hours" => Some("estimated_hours"),
        "done_ratio" => Some("done_ratio"),
        "description" => Some("description"),
        _ => None,
    }
}

fn chain_core_field(key: &str) -> Option<&'static str> {
    let base = key.split('.').next().unwrap_or(key);
    core_field_name(key).or_else(|| match base {
        "fixed_version" => Some("fixed_version_id"),
        "assigned_to" => Some("assigned_to_id"),
        _ => None,
    })
}

/// Projects a query covers: the anchor (plus descendants when included),
/// or `None` for a global query.
pub fn project_scope(
    engine: &QueryEngine<'_>,
    anchor: Option<ProjectId>,
    include_subprojects: bool,
) -> Option<Vec<ProjectId>> {
    anchor.map(|id| {
        let mut ids = vec![id];
        if include_subprojects {
            ids.extend(engine.metadata.descendants(id));
        }
        ids
    })
}

impl<'a> QueryEngine<'a> {
    fn visible_custom_fields(
        &self,
        customized: Customized,
        actor: &Actor,
        anchor: Option<ProjectId>,
        scope: Option<&[ProjectId]>,
    ) -> Vec<&'a CustomField> {
        self.metadata
            .custom_fields()
            .iter()
            .filter(|cf| cf.customized == customized && cf.is_filter)
            .filter(|cf| match (customized, scope) {
                (Customized::Issue, Some(ids)) => {
                    ids.iter().any(|p| cf.enabled_for_project(*p))
                }
                _ => true,
            })
            .filter(|cf| self.security.can_see_field(actor, cf, anchor))
            .collect()
    }

    fn user_values(&self, actor: &Actor, with_groups: bool) -> Vec<FilterValue> {
        let mut values = Vec::new();
        if actor.is_logged() {
            values.push(FilterValue::new("<< me >>", "me"));
        }
        values.extend(
            self.metadata
                .users()
                .iter()
                .map(|u| FilterValue::new(u.display_name(), u.id)),
        );
        if with_groups {
            values.extend(
                self.metadata
                    .groups()
                    .iter()
                    .map(|g| FilterValue::new(g.name.clone(), g.id)),
            );
        }
        values
    }

    fn custom_field_values(&self, cf: &CustomField, actor: &Actor) -> Vec<FilterValue> {
        match cf.format {
            FieldFormat::List => cf
                .possible_values
                .iter()
                .map(|v| FilterValue::new(v.clone(), v))
                .collect(),
            FieldFormat::Bool => vec![FilterValue::new("yes", "1"), FilterValue::new("no", "0")],
            FieldFormat::User => self.user_values(actor, false),
            FieldFormat::Version => self
                .metadata
                .versions()
                .iter()
                .map(|v| FilterValue::new(v.name.clone(), v.id))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn custom_field_definition(
        &self,
        key: String,
        name: String,
        cf: &CustomField,
        actor: &Actor,
        target: FilterTarget,
    ) -> FilterDefinition {
        let mut definition =
            FilterDefinition::new(key, name, cf.value_kind(), cf.operator_set(), target)
                .with_values(self.custom_field_values(cf, actor));
        if cf.format == FieldFormat::User && actor.is_logged() {
            definition.special_values = vec![SpecialValue::Me];
        }
        definition
    }

    /// Ordered filter definitions available to `actor` on `kind`, with the
    /// configured subproject inclusion.
    pub fn available_filters(
        &self,
        kind: EntityKind,
        actor: &Actor,
        anchor: Option<ProjectId>,
    ) -> IndexMap<String, FilterDefinition> {
        self.filters_in_scope(kind, actor, anchor, self.config.display_subprojects_issues)
    }

    /// Filters for `query`, honouring its own subproject inclusion.
    pub fn query_filters(&self, query: &Query, actor: &Actor) -> IndexMap<String, FilterDefinition> {
        let include = query
            .include_subprojects
            .unwrap_or(self.config.display_subprojects_issues);
        self.filters_in_scope(query.kind, actor, query.project_id, include)
    }

    fn filters_in_scope(
        &self,
        kind: EntityKind,
        actor: &Actor,
        anchor: Option<ProjectId>,
        include_subprojects: bool,
    ) -> IndexMap<String, FilterDefinition> {
        let filters = match kind {
            EntityKind::Issue => self.issue_filters(actor, anchor, include_subprojects),
            EntityKind::Project => self.project_filters(actor),
        };
        filters.into_iter().map(|f| (f.key.clone(), f)).collect()
    }

    fn issue_filters(
        &self,
        actor: &Actor,
        anchor: Option<ProjectId>,
        include_subprojects: bool,
    ) -> Vec<FilterDefinition> {
        use FilterTarget::*;
        use SpecialFilter as S;

        let scope = project_scope(self, anchor, include_subprojects);
        let scope_ids = scope.as_deref();
        let descendants = anchor
            .map(|id| self.metadata.descendants(id))
            .unwrap_or_default();
        let in_scope = |project: ProjectId| scope_ids.map_or(true, |ids| ids.contains(&project));

        let mut filters = Vec::new();

        let statuses = self
            .metadata
            .statuses()
            .iter()
            .map(|s| FilterValue::new(s.name.clone(), s.id))
            .collect();
        filters.push(
            FilterDefinition::new("status_id", "Status", ValueKind::List, OperatorSet::ListStatus, Special(S::Status))
                .with_values(statuses),
        );

        if anchor.is_none() || !descendants.is_empty() {
            let visible = self.security.allowed_project_ids(actor, VIEW_ISSUES);
            let projects = self
                .metadata
                .projects()
                .iter()
                .filter(|p| visible.contains(&p.id))
                .map(|p| FilterValue::new(p.name.clone(), p.id))
                .collect();
            let mut definition = FilterDefinition::new(
                "project_id",
                "Project",
                ValueKind::List,
                OperatorSet::List,
                Column("project_id"),
            )
            .with_values(projects);
            if actor.is_logged() {
                definition = definition.with_specials(&[SpecialValue::Mine, SpecialValue::Bookmarks]);
            }
            filters.push(definition);
        }

        let trackers = self
            .metadata
            .trackers_in_scope(scope_ids)
            .into_iter()
            .map(|t| FilterValue::new(t.name.clone(), t.id))
            .collect();
        filters.push(
            FilterDefinition::new("tracker_id", "Tracker", ValueKind::List, OperatorSet::List, Column("tracker_id"))
                .with_values(trackers),
        );

        let priorities = self
            .metadata
            .priorities()
            .iter()
            .map(|p| FilterValue::new(p.name.clone(), p.id))
            .collect();
        filters.push(
            FilterDefinition::new("priority_id", "Priority", ValueKind::List, OperatorSet::List, Column("priority_id"))
                .with_values(priorities),
        );

        let me = if actor.is_logged() { vec![SpecialValue::Me] } else { Vec::new() };
        filters.push(
            FilterDefinition::new("author_id", "Author", ValueKind::UserReference, OperatorSet::List, Column("author_id"))
                .with_values(self.user_values(actor, false))
                .with_specials(&me),
        );

        let mut assignee = FilterDefinition::new(
            "assigned_to_id",
            "Assignee",
            ValueKind::UserReference,
            OperatorSet::ListOptional,
            Column("assigned_to_id"),
        )
        .with_values(self.user_values(actor, self.config.issue_group_assignment))
        .with_specials(&me);
        assignee.me_includes_groups = true;
        filters.push(assignee);

        let groups: Vec<FilterValue> = self
            .metadata
            .groups()
            .iter()
            .map(|g| FilterValue::new(g.name.clone(), g.id))
            .collect();
        if !groups.is_empty() {
            filters.push(
                FilterDefinition::new(
                    "member_of_group",
                    "Assignee's group",
                    ValueKind::List,
                    OperatorSet::ListOptional,
                    Special(S::MemberOfGroup),
                )
                .with_values(groups),
            );
        }

        let roles: Vec<FilterValue> = self
            .metadata
            .roles()
            .iter()
            .filter(|r| r.builtin.is_none())
            .map(|r| FilterValue::new(r.name.clone(), r.id))
            .collect();
        if !roles.is_empty() {
            filters.push(
                FilterDefinition::new(
                    "assigned_to_role",
                    "Assignee's role",
                    ValueKind::List,
                    OperatorSet::ListOptional,
                    Special(S::AssignedToRole),
                )
                .with_values(roles),
            );
        }

        let versions: Vec<FilterValue> = self
            .metadata
            .versions()
            .iter()
            .filter(|v| in_scope(v.project_id))
            .map(|v| FilterValue::new(v.name.clone(), v.id))
            .collect();
        if !versions.is_empty() {
            filters.push(
                FilterDefinition::new(
                    "fixed_version_id",
                    "Target version",
                    ValueKind::VersionReference,
                    OperatorSet::ListOptional,
                    Column("fixed_version_id"),
                )
                .with_values(versions),
            );
            filters.push(FilterDefinition::new(
                "fixed_version.due_date",
                "Target version's Due date",
                ValueKind::Date,
                OperatorSet::Date,
                AssociationColumn {
                    association: Association::FixedVersion,
                    column: "effective_date",
                },
            ));
            filters.push(
                FilterDefinition::new(
                    "fixed_version.status",
                    "Target version's Status",
                    ValueKind::List,
                    OperatorSet::List,
                    AssociationColumn {
                        association: Association::FixedVersion,
                        column: "status",
                    },
                )
                .with_values(version_statuses()),
            );
        }

        let categories: Vec<FilterValue> = self
            .metadata
            .categories()
            .iter()
            .filter(|c| in_scope(c.project_id))
            .map(|c| FilterValue::new(c.name.clone(), c.id))
            .collect();
        if !categories.is_empty() {
            filters.push(
                FilterDefinition::new("category_id", "Category", ValueKind::List, OperatorSet::ListOptional, Column("category_id"))
                    .with_values(categories),
            );
        }

        filters.push(FilterDefinition::new("subject", "Subject", ValueKind::Text, OperatorSet::Text, Column("subject")));
        filters.push(FilterDefinition::new("description", "Description", ValueKind::Text, OperatorSet::Text, Column("description")));
        for (key, name) in [("created_on", "Created"), ("updated_on", "Updated"), ("closed_on", "Closed")] {
            filters.push(FilterDefinition::new(key, name, ValueKind::DateTime, OperatorSet::DatePast, Column(key)));
        }
        filters.push(FilterDefinition::new("start_date", "Start date", ValueKind::Date, OperatorSet::Date, Column("start_date")));
        filters.push(FilterDefinition::new("due_date", "Due date", ValueKind::Date, OperatorSet::Date, Column("due_date")));
        filters.push(FilterDefinition::new(
            "estimated_hours",
            "Estimated time",
            ValueKind::Float,
            OperatorSet::Float,
            Column("estimated_hours"),
        ));
        filters.push(FilterDefinition::new("done_ratio", "% Done", ValueKind::Integer, OperatorSet::Integer, Column("done_ratio")));

        if actor.admin || self.security.allowed_to(actor, SET_ISSUES_PRIVATE, anchor) {
            filters.push(
                FilterDefinition::new("is_private", "Private", ValueKind::Boolean, OperatorSet::List, Column("is_private"))
                    .with_values(yes_no()),
            );
        }

        filters.push(FilterDefinition::new(
            "attachment",
            "File",
            ValueKind::Text,
            OperatorSet::Text,
            Special(S::Attachment),
        ));

        if actor.is_logged() {
            filters.push(
                FilterDefinition::new("watcher_id", "Watcher", ValueKind::UserReference, OperatorSet::List, Special(S::Watcher))
                    .with_values(self.user_values(actor, false))
                    .with_specials(&me),
            );
        }

        filters.push(
            FilterDefinition::new("updated_by", "Updated by", ValueKind::UserReference, OperatorSet::List, Special(S::UpdatedBy))
                .with_values(self.user_values(actor, false))
                .with_specials(&me),
        );
        filters.push(
            FilterDefinition::new(
                "last_updated_by",
                "Last updated by",
                ValueKind::UserReference,
                OperatorSet::List,
                Special(S::LastUpdatedBy),
            )
            .with_values(self.user_values(actor, false))
            .with_specials(&me),
        );

        if !descendants.is_empty() {
            let subprojects = self
                .metadata
                .projects()
                .iter()
                .filter(|p| descendants.contains(&p.id))
                .map(|p| FilterValue::new(p.name.clone(), p.id))
                .collect();
            filters.push(
                FilterDefinition::new(
                    "subproject_id",
                    "Subproject",
                    ValueKind::List,
                    OperatorSet::ListSubprojects,
                    Special(S::Subproject),
                )
                .with_values(subprojects),
            );
        }

        for cf in self.visible_custom_fields(Customized::Issue, actor, anchor, scope_ids) {
            filters.push(self.custom_field_definition(cf.key(), cf.name.clone(), cf, actor, CustomField(cf.id)));
            if cf.is_reference() {
                filters.extend(self.referenced_filters(cf, actor, anchor));
            }
        }

        for (association, customized, label) in [
            (Association::Project, Customized::Project, "Project's"),
            (Association::Author, Customized::Principal, "Author's"),
            (Association::AssignedTo, Customized::Principal, "Assignee's"),
            (Association::FixedVersion, Customized::Version, "Target version's"),
        ] {
            let base = match association {
                Association::Project => "project",
                Association::Author => "author",
                Association::AssignedTo => "assigned_to",
                _ => "fixed_version",
            };
            for cf in self.visible_custom_fields(customized, actor, anchor, scope_ids) {
                filters.push(self.custom_field_definition(
                    format!("{base}.{}", cf.key()),
                    format!("{label} {}", cf.name),
                    cf,
                    actor,
                    AssociationCustomField {
                        association,
                        field_id: cf.id,
                    },
                ));
            }
        }

        for relation in RelationType::ALL {
            filters.push(FilterDefinition::new(
                relation.key(),
                relation_label(relation),
                ValueKind::Relation,
                OperatorSet::Relation,
                Relation(relation),
            ));
        }

        filters.push(FilterDefinition::new("parent_id", "Parent task", ValueKind::Tree, OperatorSet::Tree, Column("parent_id")));
        filters.push(FilterDefinition::new("child_id", "Subtasks", ValueKind::Tree, OperatorSet::Tree, Special(S::Child)));
        filters.push(FilterDefinition::new("issue_id", "Issue", ValueKind::Integer, OperatorSet::Integer, Special(S::IssueId)));

        let trackers = self.metadata.trackers_in_scope(scope_ids);
        if !trackers.is_empty() {
            filters.retain(|f| match chain_core_field(&f.key) {
                Some(core) => !trackers
                    .iter()
                    .all(|t| t.disabled_core_fields.iter().any(|d| d == core)),
                None => true,
            });
        }
        filters
    }

    fn referenced_filters(
        &self,
        cf: &CustomField,
        actor: &Actor,
        anchor: Option<ProjectId>,
    ) -> Vec<FilterDefinition> {
        if cf.multiple {
            return Vec::new();
        }
        let mut out = Vec::new();
        let customized = match cf.format {
            FieldFormat::Version => {
                out.push(FilterDefinition::new(
                    format!("{}.due_date", cf.key()),
                    format!("{}'s Due date", cf.name),
                    ValueKind::Date,
                    OperatorSet::Date,
                    FilterTarget::ReferencedColumn {
                        field_id: cf.id,
                        table: "versions",
                        column: "effective_date",
                    },
                ));
                out.push(
                    FilterDefinition::new(
                        format!("{}.status", cf.key()),
                        format!("{}'s Status", cf.name),
                        ValueKind::List,
                        OperatorSet::List,
                        FilterTarget::ReferencedColumn {
                            field_id: cf.id,
                            table: "versions",
                            column: "status",
                        },
                    )
                    .with_values(version_statuses()),
                );
                Customized::Version
            }
            _ => Customized::Principal,
        };
        for sub in self.visible_custom_fields(customized, actor, anchor, None) {
            out.push(self.custom_field_definition(
                format!("{}.{}", cf.key(), sub.key()),
                format!("{}'s {}", cf.name, sub.name),
                sub,
                actor,
                FilterTarget::ReferencedCustomField {
                    field_id: cf.id,
                    sub_field_id: sub.id,
                },
            ));
        }
        out
    }

    fn project_filters(&self, actor: &Actor) -> Vec<FilterDefinition> {
        use FilterTarget::*;

        let mut filters = Vec::new();
        let mut id = FilterDefinition::new("id", "Project", ValueKind::List, OperatorSet::List, Column("id"))
            .with_values(
                self.metadata
                    .projects()
                    .iter()
                    .filter(|p| !p.is_archived())
                    .map(|p| FilterValue::new(p.name.clone(), p.id))
                    .collect(),
            );
        if actor.is_logged() {
            id = id.with_specials(&[SpecialValue::Mine, SpecialValue::Bookmarks]);
        }
        filters.push(id);
        filters.push(
            FilterDefinition::new("status", "Status", ValueKind::List, OperatorSet::List, Column("status"))
                .with_values(vec![FilterValue::new("active", 1), FilterValue::new("closed", 5)]),
        );
        filters.push(FilterDefinition::new("name", "Name", ValueKind::Text, OperatorSet::Text, Column("name")));
        filters.push(FilterDefinition::new(
            "description",
            "Description",
            ValueKind::Text,
            OperatorSet::Text,
            Column("description"),
        ));
        filters.push(
            FilterDefinition::new("is_public", "Public", ValueKind::Boolean, OperatorSet::List, Column("is_public"))
                .with_values(yes_no()),
        );
        filters.push(FilterDefinition::new("parent_id", "Subproject of", ValueKind::Tree, OperatorSet::Tree, Column("parent_id")));
        filters.push(FilterDefinition::new(
            "created_on",
            "Created",
            ValueKind::DateTime,
            OperatorSet::DatePast,
            Column("created_on"),
        ));
        for cf in self.visible_custom_fields(Customized::Project, actor, None, None) {
            filters.push(self.custom_field_definition(cf.key(), cf.name.clone(), cf, actor, CustomField(cf.id)));
        }
        filters
    }

    /// Columns available to `actor` on `kind`.
    pub fn available_columns(
        &self,
        kind: EntityKind,
        actor: &Actor,
        anchor: Option<ProjectId>,
    ) -> IndexMap<String, QueryColumn> {
        self.columns_in_scope(kind, actor, anchor, self.config.display_subprojects_issues)
    }

    pub fn query_columns(&self, query: &Query, actor: &Actor) -> IndexMap<String, QueryColumn> {
        let include = query
            .include_subprojects
            .unwrap_or(self.config.display_subprojects_issues);
        self.columns_in_scope(query.kind, actor, query.project_id, include)
    }

    fn columns_in_scope(
        &self,
        kind: EntityKind,
        actor: &Actor,
        anchor: Option<ProjectId>,
        include_subprojects: bool,
    ) -> IndexMap<String, QueryColumn> {
        let columns = match kind {
            EntityKind::Issue => self.issue_columns(actor, anchor, include_subprojects),
            EntityKind::Project => self.project_columns(actor),
        };
        columns.into_iter().map(|c| (c.name.clone(), c)).collect()
    }

    fn issue_columns(
        &self,
        actor: &Actor,
        anchor: Option<ProjectId>,
        include_subprojects: bool,
    ) -> Vec<QueryColumn> {
        use ColumnSource::*;

        let mut columns = vec![
            QueryColumn::new("id", "#", Own("id")).desc(),
            QueryColumn::new("project", "Project", Association { association: crate::model::Association::Project, sort: &["name"] }).groupable(),
            QueryColumn::new("tracker", "Tracker", Association { association: crate::model::Association::Tracker, sort: &["position"] }).groupable(),
            QueryColumn::new("parent", "Parent task", Own("parent_id")).desc(),
            QueryColumn::new("status", "Status", Association { association: crate::model::Association::Status, sort: &["position"] }).groupable(),
            QueryColumn::new("priority", "Priority", Association { association: crate::model::Association::Priority, sort: &["position"] })
                .groupable()
                .desc(),
            QueryColumn::new("subject", "Subject", Own("subject")),
            QueryColumn::new("author", "Author", User(crate::model::Association::Author)).groupable(),
            QueryColumn::new("assigned_to", "Assignee", User(crate::model::Association::AssignedTo)).groupable(),
            QueryColumn::new("updated_on", "Updated", Own("updated_on")).desc(),
            QueryColumn::new("category", "Category", Association { association: crate::model::Association::Category, sort: &["name"] }).groupable(),
            QueryColumn::new("fixed_version", "Target version", Association { association: crate::model::Association::FixedVersion, sort: &["effective_date", "name"] })
                .groupable(),
            QueryColumn::new("start_date", "Start date", Own("start_date")).groupable(),
            QueryColumn::new("due_date", "Due date", Own("due_date")).groupable(),
            QueryColumn::new("estimated_hours", "Estimated time", Own("estimated_hours")).totalable(),
            QueryColumn::new("done_ratio", "% Done", Own("done_ratio")).groupable(),
            QueryColumn::new("created_on", "Created", Own("created_on")).desc(),
            QueryColumn::new("closed_on", "Closed", Own("closed_on")).desc(),
            QueryColumn::new("description", "Description", Own("description")).unsortable(),
        ];
        if actor.admin || self.security.allowed_to(actor, SET_ISSUES_PRIVATE, anchor) {
            columns.push(QueryColumn::new("is_private", "Private", Own("is_private")).groupable());
        }
        if actor.admin || self.security.allowed_to(actor, VIEW_TIME_ENTRIES, anchor) {
            columns.push(QueryColumn::new("spent_hours", "Spent time", SpentHours).totalable().desc());
        }

        let scope = project_scope(self, anchor, include_subprojects);
        for cf in self.visible_custom_fields(Customized::Issue, actor, anchor, scope.as_deref()) {
            columns.push(custom_field_column(cf));
        }

        let trackers = self.metadata.trackers_in_scope(scope.as_deref());
        if !trackers.is_empty() {
            columns.retain(|c| match core_field_name(&c.name) {
                Some(core) => !trackers
                    .iter()
                    .all(|t| t.disabled_core_fields.iter().any(|d| d == core)),
                None => true,
            });
        }
        columns
    }

    fn project_columns(&self, actor: &Actor) -> Vec<QueryColumn> {
        use ColumnSource::*;

        let mut columns = vec![
            QueryColumn::new("id", "#", Own("id")).desc(),
            QueryColumn::new("name", "Name", Own("name")),
            QueryColumn::new("status", "Status", Own("status")).groupable(),
            QueryColumn::new("is_public", "Public", Own("is_public")).groupable(),
            QueryColumn::new("parent_id", "Subproject of", Own("parent_id")).groupable(),
            QueryColumn::new("created_on", "Created", Own("created_on")).desc(),
            QueryColumn::new("description", "Description", Own("description")).unsortable(),
        ];
        for cf in self.visible_custom_fields(Customized::Project, actor, None, None) {
            columns.push(custom_field_column(cf));
        }
        columns
    }
}

fn custom_field_column(cf: &CustomField) -> QueryColumn {
    let mut column = QueryColumn::new(&cf.key(), &cf.name, ColumnSource::CustomField(cf.id));
    column.sortable = cf.is_sortable();
    column.groupable = cf.is_groupable();
    column.totalable = cf.is_totalable();
    column
}

fn version_statuses() -> Vec<FilterValue> {
    ["open", "locked", "closed"]
        .into_iter()
        .map(|s| FilterValue::new(s, s))
        .collect()
}

fn yes_no() -> Vec<FilterValue> {
    vec![FilterValue::new("yes", "1"), FilterValue::new("no", "0")]
}

fn relation_label(relation: RelationType) -> &'static str {
    match relation {
        RelationType::Relates => "Related to",
        RelationType::Duplicates => "Is duplicate of",
        RelationType::Duplicated => "Has duplicate",
        RelationType::Blocks => "Blocks",
        RelationType::Blocked => "Blocked by",
        RelationType::Precedes => "Precedes",
        RelationType::Follows => "Follows",
        RelationType::CopiedTo => "Copied to",
        RelationType::CopiedFrom => "Copied from",
    }
}
