//! Routes chat messages to operations, tricks and reactions, and posts the
//! outcome back to the room.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use perch_access::check_operation_permission;
use perch_chat::{ChatMessage, ChatRoom, MessageId};
use perch_commands::{bind_arguments, parse_command, Argument, Resolution};

use crate::messages::pick;
use crate::reactions::{Reaction, ReactionAction};
use crate::{
    BotServices, CommandError, DispatchError, InvocationContext, Reply, CURRENT_USER_CONTEXT,
    EVENT_CONTEXT,
};

pub struct Dispatcher {
    services: Arc<BotServices>,
    room: Arc<dyn ChatRoom>,
    reactions: Vec<Reaction>,
}

impl Dispatcher {
    pub fn new(services: Arc<BotServices>, room: Arc<dyn ChatRoom>, reactions: Vec<Reaction>) -> Self {
        Self {
            services,
            room,
            reactions,
        }
    }

    /// Handles room messages one at a time until the event stream closes.
    pub async fn run(&self) -> Result<()> {
        let mut events = self.room.subscribe()?;
        tracing::info!(prefix = self.services.prefix.as_str(), "dispatcher listening");
        while let Some(message) = events.recv().await {
            self.handle_message(&message).await;
        }
        tracing::info!("chat event stream closed");
        Ok(())
    }

    /// A message mentioning the prefix is only ever treated as a command;
    /// everything else is offered to the reactions.
    pub async fn handle_message(&self, message: &ChatMessage) {
        let prefix = self.services.prefix.as_str();
        if !message.content.contains(prefix) {
            self.run_reactions(message).await;
            return;
        }

        let text = match self.room.fetch_plain_text(message.message_id).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(
                    message_id = message.message_id.0,
                    error = %error,
                    "failed to fetch plain text for command message"
                );
                return;
            }
        };
        let Some(command) = text.strip_prefix(prefix) else {
            return;
        };
        if command.trim().is_empty() {
            return;
        }

        let outcome = match parse_command(command) {
            Ok(parsed) => self.invoke(message, &parsed.positional, &parsed.explicit).await,
            Err(error) => Err(DispatchError::from(error)),
        };
        self.deliver(message, outcome).await;
    }

    /// Resolves and runs one command on behalf of `message`'s author.
    pub async fn invoke(
        &self,
        message: &ChatMessage,
        positional: &[Argument],
        explicit: &BTreeMap<String, Argument>,
    ) -> Result<Option<Reply>, DispatchError> {
        let services = &self.services;
        let prefix = services.prefix.as_str();
        let user = services
            .store
            .upsert_user(message.user_id, &message.user_name)
            .await
            .map_err(CommandError::from)?;
        if !matches!(positional.first(), Some(Argument::Flag(_))) {
            return Ok(None);
        }

        match services.registry.split(positional) {
            Resolution::Unknown { parent, name, .. } if parent.is_empty() => {
                match services
                    .store
                    .get_trick(&name)
                    .await
                    .map_err(CommandError::from)?
                {
                    Some(trick) => Ok(Some(Reply::Here(trick.body))),
                    None => Err(DispatchError::Resolution(format!(
                        "There is no command named {prefix}{name}."
                    ))),
                }
            }
            Resolution::Unknown {
                parent,
                name,
                group,
            } => Err(DispatchError::Resolution(format!(
                "The group {prefix}{} has no subcommand named \"{name}\". Its subcommands are: {}",
                parent.join(" "),
                group.child_names().join(", ")
            ))),
            Resolution::Group { path, group } => Ok(Some(Reply::Here(format!(
                "Subcommands of {prefix}{} are: {}",
                path.join(" "),
                group.child_names().join(", ")
            )))),
            Resolution::Leaf {
                descriptor,
                arguments,
                ..
            } => {
                let command = descriptor.name();
                let allowed = services
                    .store
                    .command_permissions(&command)
                    .await
                    .map_err(CommandError::from)?
                    .into_iter()
                    .map(|permission| permission.group_name)
                    .collect::<BTreeSet<_>>();
                check_operation_permission(&user.group_names(), &allowed)?;

                let mut context = BTreeMap::new();
                context.insert(
                    EVENT_CONTEXT.to_string(),
                    InvocationContext::Event(message.clone()),
                );
                context.insert(
                    CURRENT_USER_CONTEXT.to_string(),
                    InvocationContext::CurrentUser(user.clone()),
                );
                let bound = bind_arguments(descriptor, arguments, explicit, &context)?;

                tracing::debug!(command = command.as_str(), user = user.id, "invoking operation");
                let body = Arc::clone(descriptor.body());
                Ok(body(Arc::clone(services), bound).await?)
            }
        }
    }

    async fn run_reactions(&self, message: &ChatMessage) {
        let bot_user_id = self.room.bot_user_id();
        for reaction in &self.reactions {
            if !reaction.accepts_author(message.user_id, bot_user_id) {
                continue;
            }
            let Some(captures) = reaction.captures(&message.content) else {
                continue;
            };
            let outcome = match reaction.action() {
                ReactionAction::Messages(messages) => Ok(Some(Reply::Here(pick(messages.as_slice())))),
                ReactionAction::Command {
                    positional,
                    explicit,
                } => {
                    let mut explicit = explicit.clone();
                    explicit.extend(captures);
                    self.invoke(message, positional, &explicit).await
                }
            };
            self.deliver(message, outcome).await;
        }
    }

    async fn deliver(&self, message: &ChatMessage, outcome: Result<Option<Reply>, DispatchError>) {
        let (text, reply_to): (String, Option<MessageId>) = match outcome {
            Ok(None) => return,
            Ok(Some(Reply::Here(text))) => (text, Some(message.message_id)),
            Ok(Some(Reply::Thread { text, reply_to })) => (text, reply_to),
            Err(error) => {
                if let DispatchError::Domain(CommandError::Store(store_error)) = &error {
                    tracing::warn!(error = %store_error, "store failure while handling command");
                } else {
                    tracing::debug!(error = %error, "command rejected");
                }
                (error.to_string(), Some(message.message_id))
            }
        };
        if let Err(error) = self.room.send(&text, reply_to).await {
            tracing::warn!(
                message_id = message.message_id.0,
                error = %error,
                "failed to post reply"
            );
        }
    }
}

#[cfg(test)]
mod tests;
