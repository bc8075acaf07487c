use std::sync::Arc;

use perch_access::{ensure_admin, ensure_can_manage, ensure_group_deletable, ensure_membership_removable};
use perch_store::{Group, StoreError};

use crate::{current_user, BotServices, CommandError, OperationResult, Reply};

use super::{emphasized_list, Arguments};

async fn existing_group(services: &BotServices, name: &str) -> Result<Group, CommandError> {
    services
        .store
        .get_group(name)
        .await?
        .ok_or_else(|| StoreError::GroupNotFound(name.to_string()).into())
}

fn user_id(raw: i64) -> Result<u64, CommandError> {
    u64::try_from(raw).map_err(|_| CommandError::message(format!("There is no user with ID {raw}.")))
}

pub(super) async fn list(services: Arc<BotServices>, _arguments: Arguments) -> OperationResult {
    let groups = services.store.list_groups().await?;
    if groups.is_empty() {
        return Ok(Some(Reply::Here("There are no groups.".to_string())));
    }
    Ok(Some(Reply::Here(format!(
        "Groups: {}",
        emphasized_list(groups.iter().map(|group| group.name.as_str()))
    ))))
}

pub(super) async fn show(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let group = existing_group(&services, arguments.string("name")?).await?;

    let mut members = Vec::with_capacity(group.members.len());
    for membership in &group.members {
        let name = match services.store.get_user(membership.user_id).await? {
            Some(user) => user.name,
            None => "unknown".to_string(),
        };
        let mut entry = format!("{name} ({})", membership.user_id);
        if membership.protected {
            entry.push_str(" [protected]");
        }
        members.push(entry);
    }

    let mut lines = vec![format!("Group _{}_", group.name)];
    lines.push(if members.is_empty() {
        "Members: none".to_string()
    } else {
        format!("Members: {}", members.join(", "))
    });
    lines.push(if group.managed_by.is_empty() {
        "Managed by: anyone".to_string()
    } else {
        format!(
            "Managed by: {}",
            emphasized_list(group.managed_by.iter().map(String::as_str))
        )
    });
    if !group.can_manage.is_empty() {
        lines.push(format!(
            "Manages: {}",
            emphasized_list(group.can_manage.iter().map(String::as_str))
        ));
    }
    Ok(Some(Reply::Here(lines.join("\n"))))
}

pub(super) async fn create(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let group = services.store.create_group(arguments.string("name")?).await?;
    Ok(Some(Reply::Here(format!("Created group _{}_.", group.name))))
}

pub(super) async fn delete(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let caller = current_user(&arguments)?;
    let group = existing_group(&services, arguments.string("name")?).await?;
    ensure_can_manage(caller, &group)?;
    ensure_group_deletable(&group)?;
    services.store.delete_group(&group.name).await?;
    tracing::info!(group = group.name.as_str(), by = caller.id, "deleted group");
    Ok(Some(Reply::Here(format!("Deleted group _{}_.", group.name))))
}

pub(super) async fn member_add(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let caller = current_user(&arguments)?;
    let group = existing_group(&services, arguments.string("group")?).await?;
    ensure_can_manage(caller, &group)?;
    let protected = arguments.flag("protected")? == "yes";
    if protected {
        ensure_admin(caller)?;
    }

    let id = user_id(arguments.int("user")?)?;
    let user = services
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| CommandError::message(format!("There is no user with ID {id}.")))?;
    services.store.add_membership(id, &group.name, protected).await?;
    Ok(Some(Reply::Here(format!(
        "Added {} to _{}_{}.",
        user.name,
        group.name,
        if protected { " as a protected member" } else { "" }
    ))))
}

pub(super) async fn member_remove(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let caller = current_user(&arguments)?;
    let group = existing_group(&services, arguments.string("group")?).await?;
    ensure_can_manage(caller, &group)?;

    let id = user_id(arguments.int("user")?)?;
    let membership = group
        .members
        .iter()
        .find(|membership| membership.user_id == id)
        .ok_or_else(|| StoreError::MembershipNotFound {
            user_id: id,
            group: group.name.clone(),
        })?;
    ensure_membership_removable(membership)?;
    services.store.remove_membership(id, &group.name).await?;
    Ok(Some(Reply::Here(format!(
        "Removed user {id} from _{}_.",
        group.name
    ))))
}

pub(super) async fn manager_add(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let caller = current_user(&arguments)?;
    let group = existing_group(&services, arguments.string("group")?).await?;
    let manager = existing_group(&services, arguments.string("manager")?).await?;
    ensure_can_manage(caller, &group)?;
    services.store.add_manager(&group.name, &manager.name).await?;
    Ok(Some(Reply::Here(format!(
        "Members of _{}_ can now manage _{}_.",
        manager.name, group.name
    ))))
}

pub(super) async fn manager_remove(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let caller = current_user(&arguments)?;
    let group = existing_group(&services, arguments.string("group")?).await?;
    let manager = arguments.string("manager")?;
    ensure_can_manage(caller, &group)?;
    services.store.remove_manager(&group.name, manager).await?;
    Ok(Some(Reply::Here(format!(
        "Members of _{manager}_ can no longer manage _{}_.",
        group.name
    ))))
}
