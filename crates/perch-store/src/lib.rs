//! Record store for users, permission groups, command permissions,
//! autolabel rules and tricks, with in-memory and SQLite backends.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

mod records;
mod sqlite;

pub use records::{
    AutolabelKind, AutolabelRule, CommandPermission, Group, GroupMembership, NewAutolabelRule,
    Trick, User,
};
pub use sqlite::SqliteBotStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("group '{0}' already exists")]
    GroupAlreadyExists(String),
    #[error("group '{0}' not found")]
    GroupNotFound(String),
    #[error("user {0} not found")]
    UserNotFound(u64),
    #[error("user {user_id} is already a member of group '{group}'")]
    MembershipExists { user_id: u64, group: String },
    #[error("user {user_id} is not a member of group '{group}'")]
    MembershipNotFound { user_id: u64, group: String },
    #[error("group '{manager}' already manages group '{group}'")]
    ManagerExists { group: String, manager: String },
    #[error("group '{manager}' does not manage group '{group}'")]
    ManagerNotFound { group: String, manager: String },
    #[error("group '{group}' is already allowed to run '{command}'")]
    PermissionExists { command: String, group: String },
    #[error("group '{group}' has no permission for '{command}'")]
    PermissionNotFound { command: String, group: String },
    #[error("autolabel rule {0} not found")]
    AutolabelRuleNotFound(i64),
    #[error("trick '{0}' not found")]
    TrickNotFound(String),
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Async store contract shared by the chat dispatcher and the webhook server.
///
/// Each call is atomic on its own; callers get no transaction spanning
/// several calls.
#[async_trait]
pub trait BotStore: Send + Sync {
    /// Creates the user or refreshes its display name; returns it with memberships.
    async fn upsert_user(&self, id: u64, name: &str) -> StoreResult<User>;
    async fn get_user(&self, id: u64) -> StoreResult<Option<User>>;

    async fn create_group(&self, name: &str) -> StoreResult<Group>;
    async fn get_group(&self, name: &str) -> StoreResult<Option<Group>>;
    async fn list_groups(&self) -> StoreResult<Vec<Group>>;
    /// Deletes the group together with its membership and management edges.
    async fn delete_group(&self, name: &str) -> StoreResult<()>;

    async fn add_membership(
        &self,
        user_id: u64,
        group: &str,
        protected: bool,
    ) -> StoreResult<GroupMembership>;
    async fn remove_membership(&self, user_id: u64, group: &str) -> StoreResult<()>;

    /// Records that members of `manager` may manage `group`.
    async fn add_manager(&self, group: &str, manager: &str) -> StoreResult<()>;
    async fn remove_manager(&self, group: &str, manager: &str) -> StoreResult<()>;

    async fn command_permissions(&self, command: &str) -> StoreResult<Vec<CommandPermission>>;
    async fn list_command_permissions(&self) -> StoreResult<Vec<CommandPermission>>;
    async fn grant_command_permission(&self, command: &str, group: &str) -> StoreResult<()>;
    async fn revoke_command_permission(&self, command: &str, group: &str) -> StoreResult<()>;

    async fn add_autolabel_rule(&self, rule: NewAutolabelRule) -> StoreResult<AutolabelRule>;
    async fn remove_autolabel_rule(&self, id: i64) -> StoreResult<AutolabelRule>;
    async fn autolabel_rules(&self, repository: Option<&str>) -> StoreResult<Vec<AutolabelRule>>;

    async fn get_trick(&self, name: &str) -> StoreResult<Option<Trick>>;
    async fn set_trick(&self, name: &str, body: &str) -> StoreResult<Trick>;
    async fn delete_trick(&self, name: &str) -> StoreResult<()>;
    async fn list_tricks(&self) -> StoreResult<Vec<Trick>>;
}

/// In-memory implementation for tests and throwaway deployments.
#[derive(Debug, Default)]
pub struct InMemoryBotStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    users: BTreeMap<u64, String>,
    groups: BTreeSet<String>,
    memberships: BTreeMap<(u64, String), bool>,
    // (group, manager)
    managers: BTreeSet<(String, String)>,
    permissions: BTreeSet<CommandPermission>,
    autolabel_rules: BTreeMap<i64, AutolabelRule>,
    next_autolabel_rule_id: i64,
    tricks: BTreeMap<String, String>,
}

impl InMemoryBotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreInner {
    fn user(&self, id: u64) -> Option<User> {
        let name = self.users.get(&id)?;
        let memberships = self
            .memberships
            .iter()
            .filter(|((user_id, _), _)| *user_id == id)
            .map(|((user_id, group_name), protected)| GroupMembership {
                user_id: *user_id,
                group_name: group_name.clone(),
                protected: *protected,
            })
            .collect();
        Some(User {
            id,
            name: name.clone(),
            memberships,
        })
    }

    fn group(&self, name: &str) -> Option<Group> {
        if !self.groups.contains(name) {
            return None;
        }
        let members = self
            .memberships
            .iter()
            .filter(|((_, group_name), _)| group_name == name)
            .map(|((user_id, group_name), protected)| GroupMembership {
                user_id: *user_id,
                group_name: group_name.clone(),
                protected: *protected,
            })
            .collect();
        let managed_by = self
            .managers
            .iter()
            .filter(|(group, _)| group == name)
            .map(|(_, manager)| manager.clone())
            .collect();
        let can_manage = self
            .managers
            .iter()
            .filter(|(_, manager)| manager == name)
            .map(|(group, _)| group.clone())
            .collect();
        Some(Group {
            name: name.to_string(),
            members,
            managed_by,
            can_manage,
        })
    }

    fn require_group(&self, name: &str) -> StoreResult<()> {
        if self.groups.contains(name) {
            Ok(())
        } else {
            Err(StoreError::GroupNotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl BotStore for InMemoryBotStore {
    async fn upsert_user(&self, id: u64, name: &str) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        inner.users.insert(id, name.to_string());
        inner.user(id).ok_or(StoreError::UserNotFound(id))
    }

    async fn get_user(&self, id: u64) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.user(id))
    }

    async fn create_group(&self, name: &str) -> StoreResult<Group> {
        let mut inner = self.inner.write().await;
        if !inner.groups.insert(name.to_string()) {
            return Err(StoreError::GroupAlreadyExists(name.to_string()));
        }
        inner
            .group(name)
            .ok_or_else(|| StoreError::GroupNotFound(name.to_string()))
    }

    async fn get_group(&self, name: &str) -> StoreResult<Option<Group>> {
        Ok(self.inner.read().await.group(name))
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let inner = self.inner.read().await;
        Ok(inner
            .groups
            .iter()
            .filter_map(|name| inner.group(name))
            .collect())
    }

    async fn delete_group(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.groups.remove(name) {
            return Err(StoreError::GroupNotFound(name.to_string()));
        }
        inner
            .memberships
            .retain(|(_, group_name), _| group_name != name);
        inner
            .managers
            .retain(|(group, manager)| group != name && manager != name);
        Ok(())
    }

    async fn add_membership(
        &self,
        user_id: u64,
        group: &str,
        protected: bool,
    ) -> StoreResult<GroupMembership> {
        let mut inner = self.inner.write().await;
        inner.require_group(group)?;
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound(user_id));
        }
        let key = (user_id, group.to_string());
        if inner.memberships.contains_key(&key) {
            return Err(StoreError::MembershipExists {
                user_id,
                group: group.to_string(),
            });
        }
        inner.memberships.insert(key, protected);
        Ok(GroupMembership {
            user_id,
            group_name: group.to_string(),
            protected,
        })
    }

    async fn remove_membership(&self, user_id: u64, group: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .memberships
            .remove(&(user_id, group.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::MembershipNotFound {
                user_id,
                group: group.to_string(),
            })
    }

    async fn add_manager(&self, group: &str, manager: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.require_group(group)?;
        inner.require_group(manager)?;
        if !inner
            .managers
            .insert((group.to_string(), manager.to_string()))
        {
            return Err(StoreError::ManagerExists {
                group: group.to_string(),
                manager: manager.to_string(),
            });
        }
        Ok(())
    }

    async fn remove_manager(&self, group: &str, manager: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner
            .managers
            .remove(&(group.to_string(), manager.to_string()))
        {
            return Err(StoreError::ManagerNotFound {
                group: group.to_string(),
                manager: manager.to_string(),
            });
        }
        Ok(())
    }

    async fn command_permissions(&self, command: &str) -> StoreResult<Vec<CommandPermission>> {
        Ok(self
            .inner
            .read()
            .await
            .permissions
            .iter()
            .filter(|permission| permission.command == command)
            .cloned()
            .collect())
    }

    async fn list_command_permissions(&self) -> StoreResult<Vec<CommandPermission>> {
        Ok(self.inner.read().await.permissions.iter().cloned().collect())
    }

    async fn grant_command_permission(&self, command: &str, group: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.require_group(group)?;
        let permission = CommandPermission {
            command: command.to_string(),
            group_name: group.to_string(),
        };
        if !inner.permissions.insert(permission) {
            return Err(StoreError::PermissionExists {
                command: command.to_string(),
                group: group.to_string(),
            });
        }
        Ok(())
    }

    async fn revoke_command_permission(&self, command: &str, group: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let permission = CommandPermission {
            command: command.to_string(),
            group_name: group.to_string(),
        };
        if !inner.permissions.remove(&permission) {
            return Err(StoreError::PermissionNotFound {
                command: command.to_string(),
                group: group.to_string(),
            });
        }
        Ok(())
    }

    async fn add_autolabel_rule(&self, rule: NewAutolabelRule) -> StoreResult<AutolabelRule> {
        let mut inner = self.inner.write().await;
        inner.next_autolabel_rule_id = inner.next_autolabel_rule_id.saturating_add(1);
        let rule = AutolabelRule::from_new(inner.next_autolabel_rule_id, rule);
        inner.autolabel_rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn remove_autolabel_rule(&self, id: i64) -> StoreResult<AutolabelRule> {
        self.inner
            .write()
            .await
            .autolabel_rules
            .remove(&id)
            .ok_or(StoreError::AutolabelRuleNotFound(id))
    }

    async fn autolabel_rules(&self, repository: Option<&str>) -> StoreResult<Vec<AutolabelRule>> {
        Ok(self
            .inner
            .read()
            .await
            .autolabel_rules
            .values()
            .filter(|rule| repository.is_none_or(|repository| rule.repository == repository))
            .cloned()
            .collect())
    }

    async fn get_trick(&self, name: &str) -> StoreResult<Option<Trick>> {
        Ok(self.inner.read().await.tricks.get(name).map(|body| Trick {
            name: name.to_string(),
            body: body.clone(),
        }))
    }

    async fn set_trick(&self, name: &str, body: &str) -> StoreResult<Trick> {
        self.inner
            .write()
            .await
            .tricks
            .insert(name.to_string(), body.to_string());
        Ok(Trick {
            name: name.to_string(),
            body: body.to_string(),
        })
    }

    async fn delete_trick(&self, name: &str) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .tricks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::TrickNotFound(name.to_string()))
    }

    async fn list_tricks(&self) -> StoreResult<Vec<Trick>> {
        Ok(self
            .inner
            .read()
            .await
            .tricks
            .iter()
            .map(|(name, body)| Trick {
                name: name.clone(),
                body: body.clone(),
            })
            .collect())
    }
}
