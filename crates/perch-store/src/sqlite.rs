//! SQLite-backed `BotStore` implementation with durable persistence.

use crate::{
    AutolabelKind, AutolabelRule, BotStore, CommandPermission, Group, GroupMembership,
    NewAutolabelRule, StoreError, StoreResult, Trick, User,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persistent SQLite store backend.
#[derive(Debug)]
pub struct SqliteBotStore {
    db_path: PathBuf,
}

impl SqliteBotStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        tracing::debug!(path = %store.db_path.display(), "opened sqlite bot store");
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS groups (
                name TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS memberships (
                user_id INTEGER NOT NULL,
                group_name TEXT NOT NULL,
                protected INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY(user_id, group_name),
                FOREIGN KEY(user_id) REFERENCES users(user_id) ON DELETE CASCADE,
                FOREIGN KEY(group_name) REFERENCES groups(name) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS group_managers (
                group_name TEXT NOT NULL,
                manager_name TEXT NOT NULL,
                PRIMARY KEY(group_name, manager_name),
                FOREIGN KEY(group_name) REFERENCES groups(name) ON DELETE CASCADE,
                FOREIGN KEY(manager_name) REFERENCES groups(name) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS command_permissions (
                command TEXT NOT NULL,
                group_name TEXT NOT NULL,
                PRIMARY KEY(command, group_name)
            );

            CREATE TABLE IF NOT EXISTS autolabel_rules (
                rule_id INTEGER PRIMARY KEY AUTOINCREMENT,
                repository TEXT NOT NULL,
                kind TEXT NOT NULL,
                pattern TEXT NOT NULL,
                label TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_autolabel_rules_repository
                ON autolabel_rules(repository);

            CREATE TABLE IF NOT EXISTS tricks (
                name TEXT PRIMARY KEY,
                body TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl BotStore for SqliteBotStore {
    async fn upsert_user(&self, id: u64, name: &str) -> StoreResult<User> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        transaction.execute(
            r#"
            INSERT INTO users (user_id, name) VALUES (?1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET name = excluded.name
            "#,
            params![u64_to_db(id)?, name],
        )?;
        let user = load_user(&transaction, id)?.ok_or(StoreError::UserNotFound(id))?;
        transaction.commit()?;
        Ok(user)
    }

    async fn get_user(&self, id: u64) -> StoreResult<Option<User>> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        load_user(&transaction, id)
    }

    async fn create_group(&self, name: &str) -> StoreResult<Group> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        if group_exists(&transaction, name)? {
            return Err(StoreError::GroupAlreadyExists(name.to_string()));
        }
        transaction.execute("INSERT INTO groups (name) VALUES (?1)", params![name])?;
        let group =
            load_group(&transaction, name)?.ok_or_else(|| StoreError::GroupNotFound(name.into()))?;
        transaction.commit()?;
        Ok(group)
    }

    async fn get_group(&self, name: &str) -> StoreResult<Option<Group>> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        load_group(&transaction, name)
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let names = {
            let mut statement = transaction.prepare("SELECT name FROM groups ORDER BY name")?;
            let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut groups = Vec::with_capacity(names.len());
        for name in names {
            if let Some(group) = load_group(&transaction, &name)? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    async fn delete_group(&self, name: &str) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let deleted = connection.execute("DELETE FROM groups WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(StoreError::GroupNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn add_membership(
        &self,
        user_id: u64,
        group: &str,
        protected: bool,
    ) -> StoreResult<GroupMembership> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        if !group_exists(&transaction, group)? {
            return Err(StoreError::GroupNotFound(group.to_string()));
        }
        let db_user_id = u64_to_db(user_id)?;
        let user_exists = transaction
            .query_row(
                "SELECT 1 FROM users WHERE user_id = ?1",
                params![db_user_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !user_exists {
            return Err(StoreError::UserNotFound(user_id));
        }
        let membership_exists = transaction
            .query_row(
                "SELECT 1 FROM memberships WHERE user_id = ?1 AND group_name = ?2",
                params![db_user_id, group],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if membership_exists {
            return Err(StoreError::MembershipExists {
                user_id,
                group: group.to_string(),
            });
        }
        transaction.execute(
            "INSERT INTO memberships (user_id, group_name, protected) VALUES (?1, ?2, ?3)",
            params![db_user_id, group, protected],
        )?;
        transaction.commit()?;
        Ok(GroupMembership {
            user_id,
            group_name: group.to_string(),
            protected,
        })
    }

    async fn remove_membership(&self, user_id: u64, group: &str) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let deleted = connection.execute(
            "DELETE FROM memberships WHERE user_id = ?1 AND group_name = ?2",
            params![u64_to_db(user_id)?, group],
        )?;
        if deleted == 0 {
            return Err(StoreError::MembershipNotFound {
                user_id,
                group: group.to_string(),
            });
        }
        Ok(())
    }

    async fn add_manager(&self, group: &str, manager: &str) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        for name in [group, manager] {
            if !group_exists(&transaction, name)? {
                return Err(StoreError::GroupNotFound(name.to_string()));
            }
        }
        let inserted = transaction.execute(
            "INSERT OR IGNORE INTO group_managers (group_name, manager_name) VALUES (?1, ?2)",
            params![group, manager],
        )?;
        if inserted == 0 {
            return Err(StoreError::ManagerExists {
                group: group.to_string(),
                manager: manager.to_string(),
            });
        }
        transaction.commit()?;
        Ok(())
    }

    async fn remove_manager(&self, group: &str, manager: &str) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let deleted = connection.execute(
            "DELETE FROM group_managers WHERE group_name = ?1 AND manager_name = ?2",
            params![group, manager],
        )?;
        if deleted == 0 {
            return Err(StoreError::ManagerNotFound {
                group: group.to_string(),
                manager: manager.to_string(),
            });
        }
        Ok(())
    }

    async fn command_permissions(&self, command: &str) -> StoreResult<Vec<CommandPermission>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT command, group_name FROM command_permissions
            WHERE command = ?1
            ORDER BY group_name
            "#,
        )?;
        let rows = statement.query_map(params![command], permission_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_command_permissions(&self) -> StoreResult<Vec<CommandPermission>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            "SELECT command, group_name FROM command_permissions ORDER BY command, group_name",
        )?;
        let rows = statement.query_map([], permission_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn grant_command_permission(&self, command: &str, group: &str) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        if !group_exists(&transaction, group)? {
            return Err(StoreError::GroupNotFound(group.to_string()));
        }
        let inserted = transaction.execute(
            "INSERT OR IGNORE INTO command_permissions (command, group_name) VALUES (?1, ?2)",
            params![command, group],
        )?;
        if inserted == 0 {
            return Err(StoreError::PermissionExists {
                command: command.to_string(),
                group: group.to_string(),
            });
        }
        transaction.commit()?;
        Ok(())
    }

    async fn revoke_command_permission(&self, command: &str, group: &str) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let deleted = connection.execute(
            "DELETE FROM command_permissions WHERE command = ?1 AND group_name = ?2",
            params![command, group],
        )?;
        if deleted == 0 {
            return Err(StoreError::PermissionNotFound {
                command: command.to_string(),
                group: group.to_string(),
            });
        }
        Ok(())
    }

    async fn add_autolabel_rule(&self, rule: NewAutolabelRule) -> StoreResult<AutolabelRule> {
        let connection = self.open_connection()?;
        connection.execute(
            "INSERT INTO autolabel_rules (repository, kind, pattern, label) VALUES (?1, ?2, ?3, ?4)",
            params![rule.repository, rule.kind.as_str(), rule.pattern, rule.label],
        )?;
        Ok(AutolabelRule::from_new(connection.last_insert_rowid(), rule))
    }

    async fn remove_autolabel_rule(&self, id: i64) -> StoreResult<AutolabelRule> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let rule = transaction
            .query_row(
                r#"
                SELECT rule_id, repository, kind, pattern, label
                FROM autolabel_rules
                WHERE rule_id = ?1
                "#,
                params![id],
                autolabel_row,
            )
            .optional()?
            .map(autolabel_rule_from_db)
            .transpose()?
            .ok_or(StoreError::AutolabelRuleNotFound(id))?;
        transaction.execute("DELETE FROM autolabel_rules WHERE rule_id = ?1", params![id])?;
        transaction.commit()?;
        Ok(rule)
    }

    async fn autolabel_rules(&self, repository: Option<&str>) -> StoreResult<Vec<AutolabelRule>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT rule_id, repository, kind, pattern, label
            FROM autolabel_rules
            WHERE ?1 IS NULL OR repository = ?1
            ORDER BY rule_id
            "#,
        )?;
        let rows = statement.query_map(params![repository], autolabel_row)?;
        rows.map(|row| autolabel_rule_from_db(row?)).collect()
    }

    async fn get_trick(&self, name: &str) -> StoreResult<Option<Trick>> {
        let connection = self.open_connection()?;
        Ok(connection
            .query_row(
                "SELECT name, body FROM tricks WHERE name = ?1",
                params![name],
                trick_from_row,
            )
            .optional()?)
    }

    async fn set_trick(&self, name: &str, body: &str) -> StoreResult<Trick> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO tricks (name, body) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET body = excluded.body
            "#,
            params![name, body],
        )?;
        Ok(Trick {
            name: name.to_string(),
            body: body.to_string(),
        })
    }

    async fn delete_trick(&self, name: &str) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let deleted = connection.execute("DELETE FROM tricks WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(StoreError::TrickNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn list_tricks(&self) -> StoreResult<Vec<Trick>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare("SELECT name, body FROM tricks ORDER BY name")?;
        let rows = statement.query_map([], trick_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

type AutolabelRow = (i64, String, String, String, String);

fn group_exists(transaction: &Transaction<'_>, name: &str) -> StoreResult<bool> {
    Ok(transaction
        .query_row(
            "SELECT 1 FROM groups WHERE name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn load_user(transaction: &Transaction<'_>, id: u64) -> StoreResult<Option<User>> {
    let db_id = u64_to_db(id)?;
    let name: Option<String> = transaction
        .query_row(
            "SELECT name FROM users WHERE user_id = ?1",
            params![db_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(name) = name else {
        return Ok(None);
    };

    let mut statement = transaction.prepare(
        r#"
        SELECT user_id, group_name, protected FROM memberships
        WHERE user_id = ?1
        ORDER BY group_name
        "#,
    )?;
    let rows = statement.query_map(params![db_id], membership_row)?;
    let memberships = rows
        .map(|row| membership_from_db(row?))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(Some(User {
        id,
        name,
        memberships,
    }))
}

fn load_group(transaction: &Transaction<'_>, name: &str) -> StoreResult<Option<Group>> {
    if !group_exists(transaction, name)? {
        return Ok(None);
    }

    let members = {
        let mut statement = transaction.prepare(
            r#"
            SELECT user_id, group_name, protected FROM memberships
            WHERE group_name = ?1
            ORDER BY user_id
            "#,
        )?;
        let rows = statement.query_map(params![name], membership_row)?;
        rows.map(|row| membership_from_db(row?))
            .collect::<StoreResult<Vec<_>>>()?
    };
    let managed_by = {
        let mut statement = transaction
            .prepare("SELECT manager_name FROM group_managers WHERE group_name = ?1")?;
        let rows = statement.query_map(params![name], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<_, _>>()?
    };
    let can_manage = {
        let mut statement = transaction
            .prepare("SELECT group_name FROM group_managers WHERE manager_name = ?1")?;
        let rows = statement.query_map(params![name], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<_, _>>()?
    };

    Ok(Some(Group {
        name: name.to_string(),
        members,
        managed_by,
        can_manage,
    }))
}

fn membership_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, bool)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn membership_from_db(
    (user_id, group_name, protected): (i64, String, bool),
) -> StoreResult<GroupMembership> {
    Ok(GroupMembership {
        user_id: u64_from_db("memberships.user_id", user_id)?,
        group_name,
        protected,
    })
}

fn permission_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommandPermission> {
    Ok(CommandPermission {
        command: row.get(0)?,
        group_name: row.get(1)?,
    })
}

fn autolabel_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AutolabelRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn autolabel_rule_from_db(
    (id, repository, kind, pattern, label): AutolabelRow,
) -> StoreResult<AutolabelRule> {
    let kind = AutolabelKind::parse(&kind).ok_or(StoreError::InvalidPersistedValue {
        field: "autolabel_rules.kind",
        value: kind,
    })?;
    Ok(AutolabelRule {
        id,
        repository,
        kind,
        pattern,
        label,
    })
}

fn trick_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trick> {
    Ok(Trick {
        name: row.get(0)?,
        body: row.get(1)?,
    })
}

fn u64_to_db(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field: "user_id",
        value: value.to_string(),
    })
}

fn u64_from_db(field: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}
