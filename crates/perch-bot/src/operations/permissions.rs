use std::collections::BTreeMap;
use std::sync::Arc;

use perch_access::ensure_admin;
use perch_store::StoreError;

use crate::{current_user, BotServices, CommandError, OperationResult, Reply};

use super::{emphasized_list, Arguments};

/// Permissions are keyed by the command's chat name, so only real leaves qualify.
fn known_command(services: &BotServices, command: &str) -> Result<String, CommandError> {
    services
        .registry
        .find(command)
        .map(|descriptor| descriptor.name())
        .ok_or_else(|| {
            CommandError::message(format!(
                "There is no command named {}{command}.",
                services.prefix
            ))
        })
}

pub(super) async fn list(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let prefix = &services.prefix;
    if let Some(command) = arguments.optional_string("command")? {
        let command = known_command(&services, command)?;
        let permissions = services.store.command_permissions(&command).await?;
        if permissions.is_empty() {
            return Ok(Some(Reply::Here(format!("Anyone may run {prefix}{command}."))));
        }
        return Ok(Some(Reply::Here(format!(
            "Members of {} may run {prefix}{command}.",
            emphasized_list(permissions.iter().map(|permission| permission.group_name.as_str()))
        ))));
    }

    let mut by_command = BTreeMap::<String, Vec<String>>::new();
    for permission in services.store.list_command_permissions().await? {
        by_command
            .entry(permission.command)
            .or_default()
            .push(permission.group_name);
    }
    if by_command.is_empty() {
        return Ok(Some(Reply::Here("No commands are restricted.".to_string())));
    }
    let lines = by_command
        .iter()
        .map(|(command, groups)| {
            format!(
                "{prefix}{command}: {}",
                emphasized_list(groups.iter().map(String::as_str))
            )
        })
        .collect::<Vec<_>>();
    Ok(Some(Reply::Here(lines.join("\n"))))
}

pub(super) async fn grant(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    ensure_admin(current_user(&arguments)?)?;
    let command = known_command(&services, arguments.string("command")?)?;
    let group = arguments.string("group")?;
    services.store.grant_command_permission(&command, group).await?;
    Ok(Some(Reply::Here(format!(
        "Members of _{group}_ may now run {}{command}.",
        services.prefix
    ))))
}

pub(super) async fn revoke(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    ensure_admin(current_user(&arguments)?)?;
    let command = known_command(&services, arguments.string("command")?)?;
    let group = arguments.string("group")?;
    match services.store.revoke_command_permission(&command, group).await {
        Ok(()) => {}
        Err(StoreError::PermissionNotFound { .. }) => {
            return Err(CommandError::message(format!(
                "The group _{group}_ had no permission to run {}{command}.",
                services.prefix
            )))
        }
        Err(error) => return Err(error.into()),
    }
    Ok(Some(Reply::Here(format!(
        "Members of _{group}_ may no longer run {}{command} unless another group allows it.",
        services.prefix
    ))))
}
