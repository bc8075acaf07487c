use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Edge between a user and a permission group.
pub struct GroupMembership {
    pub user_id: u64,
    pub group_name: String,
    /// Protected memberships cannot be removed through the normal removal path.
    pub protected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub memberships: Vec<GroupMembership>,
}

impl User {
    pub fn group_names(&self) -> BTreeSet<String> {
        self.memberships
            .iter()
            .map(|membership| membership.group_name.clone())
            .collect()
    }

    pub fn membership(&self, group_name: &str) -> Option<&GroupMembership> {
        self.memberships
            .iter()
            .find(|membership| membership.group_name == group_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A permission group.
///
/// `managed_by` is the stored direction of the management graph;
/// `can_manage` is derived from other groups' `managed_by` edges on read.
pub struct Group {
    pub name: String,
    pub members: Vec<GroupMembership>,
    pub managed_by: BTreeSet<String>,
    pub can_manage: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
/// Allows members of `group_name` to run `command` (its chat name, e.g. `group create`).
pub struct CommandPermission {
    pub command: String,
    pub group_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Enumerates supported `AutolabelKind` values.
pub enum AutolabelKind {
    BranchName,
    LinkedIssue,
}

impl AutolabelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BranchName => "branch_name",
            Self::LinkedIssue => "linked_issue",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "branch_name" => Some(Self::BranchName),
            "linked_issue" => Some(Self::LinkedIssue),
            _ => None,
        }
    }
}

impl fmt::Display for AutolabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAutolabelRule {
    pub repository: String,
    pub kind: AutolabelKind,
    /// Branch pattern (`branch_name`) or issue label (`linked_issue`).
    pub pattern: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutolabelRule {
    pub id: i64,
    pub repository: String,
    pub kind: AutolabelKind,
    pub pattern: String,
    pub label: String,
}

impl AutolabelRule {
    pub(crate) fn from_new(id: i64, rule: NewAutolabelRule) -> Self {
        Self {
            id,
            repository: rule.repository,
            kind: rule.kind,
            pattern: rule.pattern,
            label: rule.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Named text macro.
pub struct Trick {
    pub name: String,
    pub body: String,
}
