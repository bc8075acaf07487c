use std::sync::Arc;

use crate::messages::{pick, GOODBYE, HELLO, HUGS};
use crate::{current_user, triggering_event, BotServices, CommandError, OperationResult, Reply};

use super::{emphasized_list, Arguments};

/// Name of the trick that replaces the generated command listing.
/// Trick that replaces the command listing of a bare `help`.
pub(super) const HELP_TRICK: &str = "help";

pub(super) async fn help(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let prefix = &services.prefix;
    let Some(command) = arguments.optional_string("command")? else {
        if let Some(trick) = services.store.get_trick(HELP_TRICK).await? {
            return Ok(Some(Reply::Here(trick.body)));
        }
        let names = services.registry.child_names();
        return Ok(Some(Reply::Here(format!(
            "Commands: {}. Run {prefix}help \"<command>\" for details.",
            names.join(", ")
        ))));
    };

    let descriptor = services
        .registry
        .find(command)
        .ok_or_else(|| CommandError::message(format!("There is no command named {prefix}{command}.")))?;
    Ok(Some(Reply::Here(format!(
        "`{prefix}{}`: {}",
        descriptor.usage(),
        descriptor.documentation()
    ))))
}

pub(super) async fn hello(_services: Arc<BotServices>, _arguments: Arguments) -> OperationResult {
    Ok(Some(Reply::Thread {
        text: pick(HELLO),
        reply_to: None,
    }))
}

pub(super) async fn goodbye(_services: Arc<BotServices>, _arguments: Arguments) -> OperationResult {
    Ok(Some(Reply::Thread {
        text: pick(GOODBYE),
        reply_to: None,
    }))
}

pub(super) async fn hug(_services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let event = triggering_event(&arguments)?;
    Ok(Some(Reply::Here(format!("@{} {}", event.user_name, pick(HUGS)))))
}

pub(super) async fn user_show(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let user = match arguments.optional_int("user")? {
        None => current_user(&arguments)?.clone(),
        Some(id) => {
            let id = u64::try_from(id)
                .map_err(|_| CommandError::message(format!("There is no user with ID {id}.")))?;
            services
                .store
                .get_user(id)
                .await?
                .ok_or_else(|| CommandError::message(format!("There is no user with ID {id}.")))?
        }
    };

    if user.memberships.is_empty() {
        return Ok(Some(Reply::Here(format!(
            "{} (ID {}) is not a member of any groups.",
            user.name, user.id
        ))));
    }
    let groups = user
        .memberships
        .iter()
        .map(|membership| {
            if membership.protected {
                format!("{} (protected)", membership.group_name)
            } else {
                membership.group_name.clone()
            }
        })
        .collect::<Vec<_>>();
    Ok(Some(Reply::Here(format!(
        "{} (ID {}) is a member of {}.",
        user.name,
        user.id,
        emphasized_list(groups.iter().map(String::as_str))
    ))))
}
