//! Core vocabulary: entity kinds, value kinds, field paths and associations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operators::Operator;

pub type ItemId = i64;
pub type UserId = i64;
pub type ProjectId = i64;
pub type RoleId = i64;
pub type CustomFieldId = i64;

/// Project status stored in `projects.status` for archived projects.
pub const PROJECT_STATUS_ARCHIVED: i64 = 9;

/// The queryable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Issue,
    Project,
}

impl EntityKind {
    /// Logical table, also used as the alias in every statement.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Issue => "issues",
            EntityKind::Project => "projects",
        }
    }

    /// Value of `custom_values.customized_type` for this kind.
    pub fn customized_type(self) -> &'static str {
        match self {
            EntityKind::Issue => "Issue",
            EntityKind::Project => "Project",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.customized_type())
    }
}

/// Declared type of a filterable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Integer,
    Float,
    String,
    Text,
    Date,
    DateTime,
    Boolean,
    List,
    Tree,
    UserReference,
    VersionReference,
    Relation,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Float)
    }

    pub fn is_date(self) -> bool {
        matches!(self, ValueKind::Date | ValueKind::DateTime)
    }
}

/// Named operator sets offered by filter definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorSet {
    List,
    ListStatus,
    ListOptional,
    ListSubprojects,
    Date,
    DatePast,
    String,
    Text,
    Integer,
    Float,
    Relation,
    Tree,
}

impl OperatorSet {
    pub fn operators(self) -> &'static [Operator] {
        use Operator::*;
        match self {
            OperatorSet::List => &[Equals, NotEquals],
            OperatorSet::ListStatus => &[Open, Equals, NotEquals, Closed, Absent, Any],
            OperatorSet::ListOptional => &[Equals, NotEquals, Absent, Any],
            OperatorSet::ListSubprojects => &[Any, Absent, Equals],
            OperatorSet::Date => &[
                Equals,
                GreaterOrEqual,
                LessOrEqual,
                Between,
                InLessThanDays,
                InMoreThanDays,
                NextDays,
                InDays,
                Tomorrow,
                Today,
                Yesterday,
                NextWeek,
                ThisWeek,
                LastWeek,
                LastTwoWeeks,
                NextMonth,
                ThisMonth,
                LastMonth,
                ThisYear,
                LessThanDaysAgo,
                MoreThanDaysAgo,
                PastDays,
                DaysAgo,
                Absent,
                Any,
            ],
            OperatorSet::DatePast => &[
                Equals,
                GreaterOrEqual,
                LessOrEqual,
                Between,
                LessThanDaysAgo,
                MoreThanDaysAgo,
                PastDays,
                DaysAgo,
                Today,
                Yesterday,
                ThisWeek,
                LastWeek,
                LastTwoWeeks,
                ThisMonth,
                LastMonth,
                ThisYear,
                Absent,
                Any,
            ],
            OperatorSet::String => &[
                Contains,
                Equals,
                NotContains,
                NotEquals,
                StartsWith,
                EndsWith,
                Absent,
                Any,
            ],
            OperatorSet::Text => &[Contains, NotContains, StartsWith, EndsWith, Absent, Any],
            OperatorSet::Integer | OperatorSet::Float => &[
                Equals,
                GreaterOrEqual,
                LessOrEqual,
                Between,
                Absent,
                Any,
            ],
            OperatorSet::Relation => &[
                Equals,
                NotEquals,
                RelatedToProject,
                RelatedOutsideProject,
                NotRelatedToProject,
                AnyOpen,
                NoneOpen,
                Absent,
                Any,
            ],
            OperatorSet::Tree => &[Equals, Absent, Any],
        }
    }

    pub fn contains(self, op: Operator) -> bool {
        self.operators().contains(&op)
    }
}

/// A filter key: either a plain field or a one-hop chain through a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Base(String),
    Chain { base: String, sub: String },
}

impl FieldPath {
    /// Splits a dotted key. Anything deeper than one hop is not a field path.
    pub fn parse(key: &str) -> Option<FieldPath> {
        let mut parts = key.split('.');
        let base = parts.next().filter(|s| !s.is_empty())?;
        match (parts.next(), parts.next()) {
            (None, _) => Some(FieldPath::Base(base.to_string())),
            (Some(sub), None) if !sub.is_empty() => Some(FieldPath::Chain {
                base: base.to_string(),
                sub: sub.to_string(),
            }),
            _ => None,
        }
    }

    pub fn key(&self) -> String {
        match self {
            FieldPath::Base(name) => name.clone(),
            FieldPath::Chain { base, sub } => format!("{base}.{sub}"),
        }
    }
}

/// Parses a `cf_<id>` key.
pub fn custom_field_id(key: &str) -> Option<CustomFieldId> {
    key.strip_prefix("cf_")?.parse().ok()
}

/// Single-valued references from an item to another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Association {
    Project,
    Status,
    Tracker,
    Priority,
    Author,
    AssignedTo,
    FixedVersion,
    Category,
    Parent,
}

impl Association {
    /// Alias the joined table is known by.
    pub fn alias(self) -> &'static str {
        match self {
            Association::Project => "projects",
            Association::Status => "issue_statuses",
            Association::Tracker => "trackers",
            Association::Priority => "enumerations",
            Association::Author => "authors",
            Association::AssignedTo => "assignees",
            Association::FixedVersion => "versions",
            Association::Category => "issue_categories",
            Association::Parent => "parents",
        }
    }

    /// Logical table the association points at.
    pub fn table(self) -> &'static str {
        match self {
            Association::Project => "projects",
            Association::Status => "issue_statuses",
            Association::Tracker => "trackers",
            Association::Priority => "enumerations",
            Association::Author | Association::AssignedTo => "users",
            Association::FixedVersion => "versions",
            Association::Category => "issue_categories",
            Association::Parent => "issues",
        }
    }

    /// Foreign key column on the owning table.
    pub fn foreign_key(self) -> &'static str {
        match self {
            Association::Project => "project_id",
            Association::Status => "status_id",
            Association::Tracker => "tracker_id",
            Association::Priority => "priority_id",
            Association::Author => "author_id",
            Association::AssignedTo => "assigned_to_id",
            Association::FixedVersion => "fixed_version_id",
            Association::Category => "category_id",
            Association::Parent => "parent_id",
        }
    }

    /// Value of `custom_values.customized_type` for records of the target.
    pub fn customized_type(self) -> Option<&'static str> {
        match self {
            Association::Project => Some("Project"),
            Association::Author | Association::AssignedTo => Some("Principal"),
            Association::FixedVersion => Some("Version"),
            _ => None,
        }
    }

    /// Resolves the association named by the first segment of a chain key.
    pub fn from_chain_base(name: &str) -> Option<Association> {
        match name {
            "project" => Some(Association::Project),
            "author" => Some(Association::Author),
            "assigned_to" => Some(Association::AssignedTo),
            "fixed_version" => Some(Association::FixedVersion),
            _ => None,
        }
    }
}

/// Typed links between items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    Relates,
    Duplicates,
    Duplicated,
    Blocks,
    Blocked,
    Precedes,
    Follows,
    CopiedTo,
    CopiedFrom,
}

impl RelationType {
    pub const ALL: [RelationType; 9] = [
        RelationType::Relates,
        RelationType::Duplicates,
        RelationType::Duplicated,
        RelationType::Blocks,
        RelationType::Blocked,
        RelationType::Precedes,
        RelationType::Follows,
        RelationType::CopiedTo,
        RelationType::CopiedFrom,
    ];

    pub fn key(self) -> &'static str {
        match self {
            RelationType::Relates => "relates",
            RelationType::Duplicates => "duplicates",
            RelationType::Duplicated => "duplicated",
            RelationType::Blocks => "blocks",
            RelationType::Blocked => "blocked",
            RelationType::Precedes => "precedes",
            RelationType::Follows => "follows",
            RelationType::CopiedTo => "copied_to",
            RelationType::CopiedFrom => "copied_from",
        }
    }

    pub fn from_key(key: &str) -> Option<RelationType> {
        Self::ALL.into_iter().find(|t| t.key() == key)
    }

    /// Value stored in `issue_relations.relation_type`.
    pub fn stored_type(self) -> &'static str {
        match self {
            RelationType::Duplicated => "duplicates",
            RelationType::Blocked => "blocks",
            RelationType::Follows => "precedes",
            RelationType::CopiedFrom => "copied_to",
            other => other.key(),
        }
    }

    /// Reverse types read the stored edge from its target side.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            RelationType::Duplicated
                | RelationType::Blocked
                | RelationType::Follows
                | RelationType::CopiedFrom
        )
    }

    /// Symmetric types match edges in both directions.
    pub fn is_symmetric(self) -> bool {
        self == RelationType::Relates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_paths_are_at_most_one_hop() {
        assert_eq!(
            FieldPath::parse("status_id"),
            Some(FieldPath::Base("status_id".into()))
        );
        assert_eq!(
            FieldPath::parse("fixed_version.due_date"),
            Some(FieldPath::Chain {
                base: "fixed_version".into(),
                sub: "due_date".into()
            })
        );
        assert_eq!(FieldPath::parse("cf_1.cf_2.cf_3"), None);
        assert_eq!(FieldPath::parse("cf_1."), None);
        assert_eq!(FieldPath::parse(""), None);
    }

    #[test]
    fn custom_field_keys() {
        assert_eq!(custom_field_id("cf_12"), Some(12));
        assert_eq!(custom_field_id("cf_"), None);
        assert_eq!(custom_field_id("status_id"), None);
    }

    #[test]
    fn relation_types() {
        assert_eq!(RelationType::from_key("blocked"), Some(RelationType::Blocked));
        assert_eq!(RelationType::Blocked.stored_type(), "blocks");
        assert!(RelationType::Blocked.is_reverse());
        assert!(!RelationType::Blocks.is_reverse());
        assert!(RelationType::Relates.is_symmetric());
        assert_eq!(RelationType::from_key("parent"), None);
    }

    #[test]
    fn operator_sets() {
        assert!(OperatorSet::ListStatus.contains(Operator::Open));
        assert!(OperatorSet::ListStatus.contains(Operator::Absent));
        assert!(!OperatorSet::List.contains(Operator::Absent));
        assert!(OperatorSet::Date.contains(Operator::InDays));
        assert!(!OperatorSet::DatePast.contains(Operator::InDays));
        assert!(!OperatorSet::Text.contains(Operator::Equals));
    }
}
