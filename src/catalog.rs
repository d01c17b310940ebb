//! Collaborator interfaces consumed by the engine, and a JSON-backed catalog
//! implementing them.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;

use sea_query::{Alias, Cond, Expr, SimpleExpr};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::context::Actor;
use crate::model::{
    CustomFieldId, EntityKind, OperatorSet, ProjectId, RoleId, UserId, ValueKind,
    PROJECT_STATUS_ARCHIVED,
};

pub const VIEW_ISSUES: &str = "view_issues";
pub const VIEW_PRIVATE_NOTES: &str = "view_private_notes";
pub const SET_ISSUES_PRIVATE: &str = "set_issues_private";
pub const VIEW_TIME_ENTRIES: &str = "view_time_entries";

/// Which records a custom field is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Customized {
    Issue,
    Project,
    Principal,
    Version,
}

impl Customized {
    pub fn customized_type(self) -> &'static str {
        match self {
            Customized::Issue => "Issue",
            Customized::Project => "Project",
            Customized::Principal => "Principal",
            Customized::Version => "Version",
        }
    }

    pub fn for_entity(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Issue => Customized::Issue,
            EntityKind::Project => Customized::Project,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    String,
    Text,
    Link,
    Int,
    Float,
    Date,
    Bool,
    List,
    User,
    Version,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: CustomFieldId,
    pub name: String,
    pub customized: Customized,
    pub format: FieldFormat,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default = "yes")]
    pub is_filter: bool,
    #[serde(default)]
    pub is_for_all: bool,
    #[serde(default)]
    pub project_ids: Vec<ProjectId>,
    #[serde(default)]
    pub tracker_ids: Vec<i64>,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
    #[serde(default)]
    pub possible_values: Vec<String>,
}

impl CustomField {
    pub fn key(&self) -> String {
        format!("cf_{}", self.id)
    }

    pub fn value_kind(&self) -> ValueKind {
        match self.format {
            FieldFormat::String | FieldFormat::Link => ValueKind::String,
            FieldFormat::Text => ValueKind::Text,
            FieldFormat::Int => ValueKind::Integer,
            FieldFormat::Float => ValueKind::Float,
            FieldFormat::Date => ValueKind::Date,
            FieldFormat::Bool => ValueKind::Boolean,
            FieldFormat::List => ValueKind::List,
            FieldFormat::User => ValueKind::UserReference,
            FieldFormat::Version => ValueKind::VersionReference,
        }
    }

    pub fn operator_set(&self) -> OperatorSet {
        match self.format {
            FieldFormat::String | FieldFormat::Link => OperatorSet::String,
            FieldFormat::Text => OperatorSet::Text,
            FieldFormat::Int => OperatorSet::Integer,
            FieldFormat::Float => OperatorSet::Float,
            FieldFormat::Date => OperatorSet::Date,
            FieldFormat::Bool
            | FieldFormat::List
            | FieldFormat::User
            | FieldFormat::Version => OperatorSet::ListOptional,
        }
    }

    /// User and version fields can be followed one hop.
    pub fn is_reference(&self) -> bool {
        matches!(self.format, FieldFormat::User | FieldFormat::Version)
    }

    pub fn is_groupable(&self) -> bool {
        !self.multiple
            && matches!(
                self.format,
                FieldFormat::List
                    | FieldFormat::Date
                    | FieldFormat::Bool
                    | FieldFormat::Int
                    | FieldFormat::Float
                    | FieldFormat::String
                    | FieldFormat::User
                    | FieldFormat::Version
            )
    }

    pub fn is_sortable(&self) -> bool {
        !self.multiple && !matches!(self.format, FieldFormat::Text)
    }

    /// Single-valued numeric fields; summed through their one value row.
    pub fn is_totalable(&self) -> bool {
        !self.multiple && matches!(self.format, FieldFormat::Int | FieldFormat::Float)
    }

    pub fn enabled_for_project(&self, project: ProjectId) -> bool {
        self.is_for_all || self.project_ids.contains(&project)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    pub id: i64,
    pub name: String,
    /// Core fields switched off for this tracker, e.g. `due_date`.
    #[serde(default)]
    pub disabled_core_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumeration {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<ProjectId>,
    #[serde(default = "yes")]
    pub is_public: bool,
    #[serde(default = "active_status")]
    pub status: i64,
    #[serde(default)]
    pub tracker_ids: Vec<i64>,
}

fn active_status() -> i64 {
    1
}

impl ProjectRecord {
    pub fn is_archived(&self) -> bool {
        self.status == PROJECT_STATUS_ARCHIVED
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: i64,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default = "open_status")]
    pub status: String,
}

fn open_status() -> String {
    "open".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub project_id: ProjectId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub login: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
}

impl UserRecord {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.firstname, self.lastname);
        let full = full.trim();
        if full.is_empty() {
            self.login.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinRole {
    NonMember,
    Anonymous,
}

/// Which issues a role may see in its projects. Ordered from narrowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuesVisibility {
    Own,
    #[default]
    Default,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub builtin: Option<BuiltinRole>,
    #[serde(default)]
    pub issues_visibility: IssuesVisibility,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub assignable: bool,
}

impl Role {
    pub fn allows(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// A principal (user or group) holding roles in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub user_id: UserId,
    pub project_ids: Vec<ProjectId>,
}

/// Schema metadata: custom fields and the records filter values refer to.
pub trait MetadataProvider {
    fn custom_fields(&self) -> &[CustomField];
    fn statuses(&self) -> &[IssueStatus];
    fn trackers(&self) -> &[Tracker];
    fn priorities(&self) -> &[Enumeration];
    fn projects(&self) -> &[ProjectRecord];
    fn versions(&self) -> &[VersionRecord];
    fn categories(&self) -> &[CategoryRecord];
    fn users(&self) -> &[UserRecord];
    fn groups(&self) -> &[GroupRecord];
    fn roles(&self) -> &[Role];

    fn custom_field(&self, id: CustomFieldId) -> Option<&CustomField> {
        self.custom_fields().iter().find(|cf| cf.id == id)
    }

    fn project(&self, id: ProjectId) -> Option<&ProjectRecord> {
        self.projects().iter().find(|p| p.id == id)
    }

    fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles().iter().find(|r| r.id == id)
    }

    /// All projects below `id`, breadth first, excluding `id`.
    fn descendants(&self, id: ProjectId) -> Vec<ProjectId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(parent) = queue.pop_front() {
            for child in self.projects().iter().filter(|p| p.parent_id == Some(parent)) {
                if child.id != id && !out.contains(&child.id) {
                    out.push(child.id);
                    queue.push_back(child.id);
                }
            }
        }
        out
    }

    /// Trackers enabled on the given projects, or every tracker when global.
    fn trackers_in_scope(&self, projects: Option<&[ProjectId]>) -> Vec<&Tracker> {
        match projects {
            None => self.trackers().iter().collect(),
            Some(ids) => {
                let enabled: HashSet<i64> = self
                    .projects()
                    .iter()
                    .filter(|p| ids.contains(&p.id))
                    .flat_map(|p| p.tracker_ids.iter().copied())
                    .collect();
                self.trackers()
                    .iter()
                    .filter(|t| enabled.contains(&t.id))
                    .collect()
            }
        }
    }
}

/// Resolves who the actor is: groups, memberships, bookmarks.
pub trait IdentityProvider {
    fn group_ids(&self, user: UserId) -> Vec<UserId>;

    /// Direct memberships plus those inherited through groups.
    fn memberships(&self, user: UserId) -> Vec<Membership>;

    fn bookmarked_project_ids(&self, user: UserId) -> Vec<ProjectId>;

    fn member_project_ids(&self, user: UserId) -> Vec<ProjectId> {
        let mut ids: Vec<ProjectId> = self
            .memberships(user)
            .into_iter()
            .map(|m| m.project_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Row-level restriction supplied by the security collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Visibility {
    Unrestricted,
    Restricted(SimpleExpr),
}

/// Capability checks and the mandatory visibility predicate.
pub trait SecurityProvider {
    fn visibility_predicate(
        &self,
        actor: &Actor,
        kind: EntityKind,
        anchor: Option<ProjectId>,
    ) -> Visibility;

    fn can_see_field(&self, actor: &Actor, field: &CustomField, anchor: Option<ProjectId>) -> bool;

    fn allowed_to(&self, actor: &Actor, permission: &str, anchor: Option<ProjectId>) -> bool;

    /// Every non-archived project in which the actor holds `permission`.
    fn allowed_project_ids(&self, actor: &Actor, permission: &str) -> Vec<ProjectId>;

    /// Roles the actor holds in `project` (builtin roles included).
    fn role_ids_in(&self, actor: &Actor, project: ProjectId) -> Vec<RoleId>;
}

/// Metadata and identity loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub custom_fields: Vec<CustomField>,
    pub statuses: Vec<IssueStatus>,
    pub trackers: Vec<Tracker>,
    pub priorities: Vec<Enumeration>,
    pub projects: Vec<ProjectRecord>,
    pub versions: Vec<VersionRecord>,
    pub categories: Vec<CategoryRecord>,
    pub users: Vec<UserRecord>,
    pub groups: Vec<GroupRecord>,
    pub roles: Vec<Role>,
    pub memberships: Vec<Membership>,
    pub bookmarks: Vec<Bookmark>,
}

impl Catalog {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let display = path_ref.display().to_string();
        if !path_ref.exists() {
            return Err(ConfigError::Missing(display));
        }
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }
}

impl MetadataProvider for Catalog {
    fn custom_fields(&self) -> &[CustomField] {
        &self.custom_fields
    }
    fn statuses(&self) -> &[IssueStatus] {
        &self.statuses
    }
    fn trackers(&self) -> &[Tracker] {
        &self.trackers
    }
    fn priorities(&self) -> &[Enumeration] {
        &self.priorities
    }
    fn projects(&self) -> &[ProjectRecord] {
        &self.projects
    }
    fn versions(&self) -> &[VersionRecord] {
        &self.versions
    }
    fn categories(&self) -> &[CategoryRecord] {
        &self.categories
    }
    fn users(&self) -> &[UserRecord] {
        &self.users
    }
    fn groups(&self) -> &[GroupRecord] {
        &self.groups
    }
    fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl IdentityProvider for Catalog {
    fn group_ids(&self, user: UserId) -> Vec<UserId> {
        self.groups
            .iter()
            .filter(|g| g.user_ids.contains(&user))
            .map(|g| g.id)
            .collect()
    }

    fn memberships(&self, user: UserId) -> Vec<Membership> {
        let principals: Vec<UserId> = std::iter::once(user)
            .chain(self.group_ids(user))
            .collect();
        self.memberships
            .iter()
            .filter(|m| principals.contains(&m.user_id))
            .cloned()
            .collect()
    }

    fn bookmarked_project_ids(&self, user: UserId) -> Vec<ProjectId> {
        self.bookmarks
            .iter()
            .filter(|b| b.user_id == user)
            .flat_map(|b| b.project_ids.iter().copied())
            .collect()
    }
}

/// Role/membership based security over a catalog.
pub struct RoleBasedSecurity<'a, C> {
    catalog: &'a C,
}

impl<'a, C> RoleBasedSecurity<'a, C>
where
    C: MetadataProvider + IdentityProvider,
{
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    fn roles_for(&self, actor: &Actor, project: &ProjectRecord) -> Vec<&'a Role> {
        if project.is_archived() {
            return Vec::new();
        }
        let builtin = |kind: BuiltinRole| -> Vec<&'a Role> {
            if !project.is_public {
                return Vec::new();
            }
            self.catalog
                .roles()
                .iter()
                .filter(|r| r.builtin == Some(kind))
                .collect()
        };
        match actor.id {
            Some(user) => {
                let mut ids: Vec<RoleId> = self
                    .catalog
                    .memberships(user)
                    .into_iter()
                    .filter(|m| m.project_id == project.id)
                    .flat_map(|m| m.role_ids)
                    .collect();
                ids.sort_unstable();
                ids.dedup();
                if ids.is_empty() {
                    builtin(BuiltinRole::NonMember)
                } else {
                    ids.into_iter()
                        .filter_map(|id| self.catalog.role(id))
                        .collect()
                }
            }
            None => builtin(BuiltinRole::Anonymous),
        }
    }

    fn scope(&self, anchor: Option<ProjectId>) -> Vec<&'a ProjectRecord> {
        let projects = self.catalog.projects();
        match anchor {
            Some(id) => {
                let mut ids = vec![id];
                ids.extend(self.catalog.descendants(id));
                projects.iter().filter(|p| ids.contains(&p.id)).collect()
            }
            None => projects.iter().collect(),
        }
    }

    fn issue_visibility(&self, actor: &Actor, anchor: Option<ProjectId>) -> SimpleExpr {
        let issues = Alias::new(EntityKind::Issue.table());
        let col = |name: &str| Expr::col((issues.clone(), Alias::new(name)));

        let mut all = Vec::new();
        let mut default = Vec::new();
        let mut own = Vec::new();
        for project in self.scope(anchor) {
            let best = self
                .roles_for(actor, project)
                .into_iter()
                .filter(|r| r.allows(VIEW_ISSUES))
                .map(|r| r.issues_visibility)
                .max();
            match best {
                Some(IssuesVisibility::All) => all.push(project.id),
                Some(IssuesVisibility::Default) => default.push(project.id),
                Some(IssuesVisibility::Own) => own.push(project.id),
                None => {}
            }
        }

        let user_ids: Vec<UserId> = actor
            .id
            .map(|id| std::iter::once(id).chain(self.catalog.group_ids(id)).collect())
            .unwrap_or_default();
        let own_condition = |me: UserId| {
            Cond::any()
                .add(col("author_id").eq(me))
                .add(col("assigned_to_id").is_in(user_ids.iter().copied()))
        };

        let mut any = Cond::any();
        if !all.is_empty() {
            any = any.add(col("project_id").is_in(all));
        }
        if !default.is_empty() {
            let mut not_private = Cond::any().add(col("is_private").eq(false));
            if let Some(me) = actor.id {
                not_private = not_private.add(own_condition(me));
            }
            any = any.add(
                Cond::all()
                    .add(col("project_id").is_in(default))
                    .add(not_private),
            );
        }
        if let (false, Some(me)) = (own.is_empty(), actor.id) {
            any = any.add(
                Cond::all()
                    .add(col("project_id").is_in(own))
                    .add(own_condition(me)),
            );
        }
        if any.is_empty() {
            return Expr::val(1).eq(0);
        }
        any.into()
    }

    fn project_visibility(&self, actor: &Actor) -> SimpleExpr {
        let member_of = actor
            .id
            .map(|id| self.catalog.member_project_ids(id))
            .unwrap_or_default();
        let ids: Vec<ProjectId> = self
            .catalog
            .projects()
            .iter()
            .filter(|p| !p.is_archived() && (p.is_public || member_of.contains(&p.id)))
            .map(|p| p.id)
            .collect();
        if ids.is_empty() {
            return Expr::val(1).eq(0);
        }
        Expr::col((Alias::new(EntityKind::Project.table()), Alias::new("id"))).is_in(ids)
    }
}

impl<'a, C> SecurityProvider for RoleBasedSecurity<'a, C>
where
    C: MetadataProvider + IdentityProvider,
{
    fn visibility_predicate(
        &self,
        actor: &Actor,
        kind: EntityKind,
        anchor: Option<ProjectId>,
    ) -> Visibility {
        if actor.admin {
            return Visibility::Unrestricted;
        }
        match kind {
            EntityKind::Issue => Visibility::Restricted(self.issue_visibility(actor, anchor)),
            EntityKind::Project => Visibility::Restricted(self.project_visibility(actor)),
        }
    }

    fn can_see_field(&self, actor: &Actor, field: &CustomField, anchor: Option<ProjectId>) -> bool {
        if field.visible || actor.admin {
            return true;
        }
        let projects: Vec<ProjectId> = match anchor {
            Some(id) => vec![id],
            None => self.catalog.projects().iter().map(|p| p.id).collect(),
        };
        projects
            .into_iter()
            .flat_map(|p| self.role_ids_in(actor, p))
            .any(|role| field.role_ids.contains(&role))
    }

    fn allowed_to(&self, actor: &Actor, permission: &str, anchor: Option<ProjectId>) -> bool {
        match anchor {
            Some(id) => match self.catalog.project(id) {
                Some(project) if !project.is_archived() => {
                    actor.admin
                        || self
                            .roles_for(actor, project)
                            .iter()
                            .any(|r| r.allows(permission))
                }
                _ => false,
            },
            None => !self.allowed_project_ids(actor, permission).is_empty(),
        }
    }

    fn allowed_project_ids(&self, actor: &Actor, permission: &str) -> Vec<ProjectId> {
        self.catalog
            .projects()
            .iter()
            .filter(|p| !p.is_archived())
            .filter(|p| {
                actor.admin || self.roles_for(actor, p).iter().any(|r| r.allows(permission))
            })
            .map(|p| p.id)
            .collect()
    }

    fn role_ids_in(&self, actor: &Actor, project: ProjectId) -> Vec<RoleId> {
        self.catalog
            .project(project)
            .map(|p| self.roles_for(actor, p).into_iter().map(|r| r.id).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{PostgresQueryBuilder, Query};

    fn catalog() -> Catalog {
        serde_json::from_str(
            r#"{
                "projects": [
                    { "id": 1, "name": "eCookbook", "tracker_ids": [1, 2] },
                    { "id": 2, "name": "Private child", "parent_id": 1, "is_public": false, "tracker_ids": [1] },
                    { "id": 3, "name": "Archived", "status": 9 }
                ],
                "trackers": [
                    { "id": 1, "name": "Bug" },
                    { "id": 2, "name": "Feature", "disabled_core_fields": ["due_date"] },
                    { "id": 3, "name": "Support" }
                ],
                "roles": [
                    { "id": 1, "name": "Manager", "issues_visibility": "all",
                      "permissions": ["view_issues", "view_private_notes"] },
                    { "id": 2, "name": "Reporter", "issues_visibility": "own", "permissions": ["view_issues"] },
                    { "id": 4, "name": "Non member", "builtin": "non_member", "permissions": ["view_issues"] },
                    { "id": 5, "name": "Anonymous", "builtin": "anonymous", "permissions": ["view_issues"] }
                ],
                "groups": [ { "id": 10, "name": "Devs", "user_ids": [2] } ],
                "memberships": [
                    { "user_id": 2, "project_id": 1, "role_ids": [2] },
                    { "user_id": 10, "project_id": 2, "role_ids": [1] }
                ],
                "custom_fields": [
                    { "id": 1, "name": "Secret", "customized": "issue", "format": "string",
                      "visible": false, "role_ids": [1] }
                ]
            }"#,
        )
        .unwrap()
    }

    fn where_sql(expr: SimpleExpr) -> String {
        Query::select()
            .expr(Expr::val(1))
            .and_where(expr)
            .to_string(PostgresQueryBuilder)
    }

    #[test]
    fn descendants_and_trackers() {
        let catalog = catalog();
        assert_eq!(catalog.descendants(1), vec![2]);
        assert!(catalog.descendants(2).is_empty());
        let trackers: Vec<i64> = catalog
            .trackers_in_scope(Some(&[2]))
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(trackers, vec![1]);
    }

    #[test]
    fn group_memberships_are_inherited() {
        let catalog = catalog();
        assert_eq!(catalog.group_ids(2), vec![10]);
        assert_eq!(catalog.member_project_ids(2), vec![1, 2]);
    }

    #[test]
    fn admin_is_unrestricted() {
        let catalog = catalog();
        let security = RoleBasedSecurity::new(&catalog);
        assert_eq!(
            security.visibility_predicate(&Actor::admin(1), EntityKind::Issue, None),
            Visibility::Unrestricted
        );
    }

    #[test]
    fn issue_visibility_follows_best_role_per_project() {
        let catalog = catalog();
        let security = RoleBasedSecurity::new(&catalog);
        let Visibility::Restricted(expr) =
            security.visibility_predicate(&Actor::user(2), EntityKind::Issue, None)
        else {
            panic!("expected a restriction");
        };
        let sql = where_sql(expr);
        // "all" through the group in project 2, "own" in project 1
        assert!(sql.contains(r#""issues"."project_id" IN (2)"#), "{sql}");
        assert!(sql.contains(r#""issues"."project_id" IN (1)"#), "{sql}");
        assert!(sql.contains(r#""issues"."author_id" = 2"#), "{sql}");
        assert!(!sql.contains("3"), "archived project leaked: {sql}");
    }

    #[test]
    fn anonymous_sees_public_non_private_issues_only() {
        let catalog = catalog();
        let security = RoleBasedSecurity::new(&catalog);
        let Visibility::Restricted(expr) =
            security.visibility_predicate(&Actor::anonymous(), EntityKind::Issue, None)
        else {
            panic!("expected a restriction");
        };
        let sql = where_sql(expr);
        assert!(sql.contains(r#""issues"."project_id" IN (1)"#), "{sql}");
        assert!(sql.contains(r#""issues"."is_private" = FALSE"#), "{sql}");
    }

    #[test]
    fn nothing_visible_is_false_not_missing() {
        let catalog = Catalog::default();
        let security = RoleBasedSecurity::new(&catalog);
        assert_eq!(
            security.visibility_predicate(&Actor::user(5), EntityKind::Issue, None),
            Visibility::Restricted(Expr::val(1).eq(0))
        );
    }

    #[test]
    fn hidden_custom_field_needs_a_role() {
        let catalog = catalog();
        let security = RoleBasedSecurity::new(&catalog);
        let field = &catalog.custom_fields[0];
        assert!(security.can_see_field(&Actor::user(2), field, Some(2)));
        assert!(!security.can_see_field(&Actor::user(2), field, Some(1)));
        assert!(!security.can_see_field(&Actor::anonymous(), field, None));
        assert!(security.can_see_field(&Actor::admin(9), field, None));
    }

    #[test]
    fn permissions_by_project() {
        let catalog = catalog();
        let security = RoleBasedSecurity::new(&catalog);
        let actor = Actor::user(2);
        assert!(security.allowed_to(&actor, VIEW_PRIVATE_NOTES, Some(2)));
        assert!(!security.allowed_to(&actor, VIEW_PRIVATE_NOTES, Some(1)));
        assert_eq!(
            security.allowed_project_ids(&actor, VIEW_PRIVATE_NOTES),
            vec![2]
        );
        assert!(!security.allowed_to(&Actor::admin(1), VIEW_ISSUES, Some(3)));
    }
}
