//! Permission resolution for command invocation and group management.
//!
//! Every check here is a pure function over records already loaded from the
//! store. Callers check first and mutate afterwards, so a concurrent change
//! between the two steps is not detected.

use std::collections::BTreeSet;

use perch_store::{Group, GroupMembership, User};
use thiserror::Error;

/// Members of this group pass every permission and management check.
pub const ADMIN_GROUP: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// User-facing permission denials.
pub enum PermissionError {
    #[error("Only members of groups {} may run that command.", format_groups(.allowed))]
    CommandRestricted { allowed: BTreeSet<String> },
    #[error("Only members of groups {} may manage the group _{group}_.", format_groups(.managers))]
    NotManager {
        group: String,
        managers: BTreeSet<String>,
    },
    #[error("The _admin_ group cannot be deleted.")]
    AdminGroupUndeletable,
    #[error("The group _{group}_ has protected members and cannot be deleted.")]
    ProtectedMembers { group: String },
    #[error("The membership of user {user_id} in _{group}_ is protected.")]
    ProtectedMembership { user_id: u64, group: String },
    #[error("Only members of the _admin_ group may do that.")]
    AdminOnly,
}

fn format_groups(groups: &BTreeSet<String>) -> String {
    groups
        .iter()
        .map(|name| format!("_{name}_"))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn is_admin(caller_groups: &BTreeSet<String>) -> bool {
    caller_groups.contains(ADMIN_GROUP)
}

/// Allows the call when the caller is an admin, when no group is recorded
/// for the operation, or when the caller shares at least one group with it.
pub fn check_operation_permission(
    caller_groups: &BTreeSet<String>,
    allowed_groups: &BTreeSet<String>,
) -> Result<(), PermissionError> {
    if is_admin(caller_groups)
        || allowed_groups.is_empty()
        || !caller_groups.is_disjoint(allowed_groups)
    {
        return Ok(());
    }
    Err(PermissionError::CommandRestricted {
        allowed: allowed_groups.clone(),
    })
}

/// A group with no managers can be managed by anyone.
pub fn can_manage(user: &User, group: &Group) -> bool {
    let caller_groups = user.group_names();
    is_admin(&caller_groups)
        || group.managed_by.is_empty()
        || !caller_groups.is_disjoint(&group.managed_by)
}

pub fn ensure_can_manage(user: &User, group: &Group) -> Result<(), PermissionError> {
    if can_manage(user, group) {
        return Ok(());
    }
    Err(PermissionError::NotManager {
        group: group.name.clone(),
        managers: group.managed_by.clone(),
    })
}

pub fn ensure_group_deletable(group: &Group) -> Result<(), PermissionError> {
    if group.name == ADMIN_GROUP {
        return Err(PermissionError::AdminGroupUndeletable);
    }
    if group.members.iter().any(|membership| membership.protected) {
        return Err(PermissionError::ProtectedMembers {
            group: group.name.clone(),
        });
    }
    Ok(())
}

pub fn ensure_membership_removable(membership: &GroupMembership) -> Result<(), PermissionError> {
    if membership.protected {
        return Err(PermissionError::ProtectedMembership {
            user_id: membership.user_id,
            group: membership.group_name.clone(),
        });
    }
    Ok(())
}

pub fn ensure_admin(user: &User) -> Result<(), PermissionError> {
    if is_admin(&user.group_names()) {
        Ok(())
    } else {
        Err(PermissionError::AdminOnly)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use perch_store::{Group, GroupMembership, User};

    use super::{
        can_manage, check_operation_permission, ensure_admin, ensure_can_manage,
        ensure_group_deletable, ensure_membership_removable, PermissionError,
    };

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn user_in(groups: &[(&str, bool)]) -> User {
        User {
            id: 10,
            name: "dana".into(),
            memberships: groups
                .iter()
                .map(|(group, protected)| GroupMembership {
                    user_id: 10,
                    group_name: group.to_string(),
                    protected: *protected,
                })
                .collect(),
        }
    }

    fn group(name: &str, managed_by: &[&str]) -> Group {
        Group {
            name: name.into(),
            members: Vec::new(),
            managed_by: names(managed_by),
            can_manage: BTreeSet::new(),
        }
    }

    #[test]
    fn unit_operation_without_permission_rows_is_open_to_everyone() {
        assert!(check_operation_permission(&BTreeSet::new(), &BTreeSet::new()).is_ok());
    }

    #[test]
    fn unit_operation_permission_requires_shared_group_unless_admin() {
        let allowed = names(&["mods", "helpers"]);
        assert!(check_operation_permission(&names(&["helpers"]), &allowed).is_ok());
        assert!(check_operation_permission(&names(&["admin"]), &allowed).is_ok());
        let denied = check_operation_permission(&names(&["users"]), &allowed)
            .expect_err("denied");
        assert_eq!(
            denied.to_string(),
            "Only members of groups _helpers_ | _mods_ may run that command."
        );
    }

    #[test]
    fn functional_can_manage_follows_managed_by_edges() {
        let helpers = group("helpers", &["mods"]);
        assert!(can_manage(&user_in(&[("admin", false)]), &helpers));
        assert!(can_manage(&user_in(&[("mods", false)]), &helpers));
        assert!(!can_manage(&user_in(&[("helpers", false)]), &helpers));
        assert!(!can_manage(&user_in(&[]), &helpers));
        assert!(can_manage(&user_in(&[]), &group("open", &[])));
    }

    #[test]
    fn functional_ensure_can_manage_names_the_managers() {
        let error = ensure_can_manage(&user_in(&[]), &group("helpers", &["mods"]))
            .expect_err("denied");
        assert_eq!(
            error.to_string(),
            "Only members of groups _mods_ may manage the group _helpers_."
        );
    }

    #[test]
    fn regression_protected_memberships_block_removal_and_deletion() {
        let membership = GroupMembership {
            user_id: 3,
            group_name: "mods".into(),
            protected: true,
        };
        assert_eq!(
            ensure_membership_removable(&membership).expect_err("protected"),
            PermissionError::ProtectedMembership {
                user_id: 3,
                group: "mods".into()
            }
        );

        let mut mods = group("mods", &[]);
        assert!(ensure_group_deletable(&mods).is_ok());
        mods.members.push(membership);
        assert!(matches!(
            ensure_group_deletable(&mods),
            Err(PermissionError::ProtectedMembers { .. })
        ));
        assert_eq!(
            ensure_group_deletable(&group("admin", &[])),
            Err(PermissionError::AdminGroupUndeletable)
        );
    }

    #[test]
    fn unit_ensure_admin_checks_admin_membership() {
        assert!(ensure_admin(&user_in(&[("admin", true)])).is_ok());
        assert_eq!(
            ensure_admin(&user_in(&[("mods", false)])),
            Err(PermissionError::AdminOnly)
        );
    }
}
