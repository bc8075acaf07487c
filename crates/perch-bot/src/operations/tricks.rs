use std::sync::Arc;

use crate::{BotServices, CommandError, OperationResult, Reply};

use super::general::HELP_TRICK;
use super::Arguments;

pub(super) async fn list(services: Arc<BotServices>, _arguments: Arguments) -> OperationResult {
    let tricks = services.store.list_tricks().await?;
    if tricks.is_empty() {
        return Ok(Some(Reply::Here("There are no tricks.".to_string())));
    }
    let names = tricks
        .iter()
        .map(|trick| trick.name.as_str())
        .collect::<Vec<_>>();
    Ok(Some(Reply::Here(format!("Tricks: {}", names.join(", ")))))
}

pub(super) async fn show(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let name = arguments.string("name")?;
    let trick = services
        .store
        .get_trick(name)
        .await?
        .ok_or_else(|| CommandError::message(format!("There is no trick named {name}.")))?;
    Ok(Some(Reply::Here(trick.body)))
}

pub(super) async fn set(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let name = arguments.string("name")?;
    if name.trim().is_empty() || name.contains(char::is_whitespace) {
        return Err(CommandError::message("Trick names must be a single word."));
    }
    // Tricks only answer unknown top-level names, apart from the help override.
    if name != HELP_TRICK && services.registry.child_names().contains(&name) {
        return Err(CommandError::message(format!(
            "{}{name} is already a command.",
            services.prefix
        )));
    }
    let trick = services.store.set_trick(name, arguments.string("body")?).await?;
    Ok(Some(Reply::Here(format!(
        "Saved trick {}{}.",
        services.prefix, trick.name
    ))))
}

pub(super) async fn delete(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let name = arguments.string("name")?;
    services.store.delete_trick(name).await?;
    Ok(Some(Reply::Here(format!("Deleted trick {name}."))))
}
