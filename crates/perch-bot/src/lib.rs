//! Perch chat bot: command dispatch, the operation catalog, reactions and
//! process wiring.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use perch_chat::{ChatMessage, MessageId};
use perch_commands::{BoundArguments, CommandTree};
use perch_github::GithubApi;
use perch_store::{BotStore, User};

pub mod bootstrap;
pub mod config;
pub mod dispatcher;
mod errors;
pub mod messages;
pub mod operations;
pub mod reactions;

pub use dispatcher::Dispatcher;
pub use errors::{CommandError, DispatchError};

/// Default command prefix.
pub const DEFAULT_PREFIX: &str = "!!/";

/// Context key carrying the triggering [`ChatMessage`].
pub const EVENT_CONTEXT: &str = "event";
/// Context key carrying the calling [`User`].
pub const CURRENT_USER_CONTEXT: &str = "current_user";

#[derive(Debug, Clone, PartialEq, Eq)]
/// What an operation asks the dispatcher to post.
pub enum Reply {
    /// Threaded under the triggering message.
    Here(String),
    /// Threaded under `reply_to`, or a new thread when `None`.
    Thread {
        text: String,
        reply_to: Option<MessageId>,
    },
}

#[derive(Debug, Clone)]
/// Values the dispatcher supplies for contextual parameters.
pub enum InvocationContext {
    Event(ChatMessage),
    CurrentUser(User),
}

pub type OperationResult = Result<Option<Reply>, CommandError>;
pub type OperationFuture = Pin<Box<dyn Future<Output = OperationResult> + Send + 'static>>;
pub type OperationBody =
    Arc<dyn Fn(Arc<BotServices>, BoundArguments<InvocationContext>) -> OperationFuture + Send + Sync>;
pub type Registry = CommandTree<OperationBody>;

/// Collaborators shared by the dispatcher and every operation body.
pub struct BotServices {
    pub store: Arc<dyn BotStore>,
    pub github: Arc<dyn GithubApi>,
    /// Account owning the repositories `issue` operations act on.
    pub github_owner: String,
    pub registry: Arc<Registry>,
    pub prefix: String,
}

/// Reads the calling user out of the bound context.
pub fn current_user(arguments: &BoundArguments<InvocationContext>) -> Result<&User, CommandError> {
    match arguments.context(CURRENT_USER_CONTEXT) {
        Some(InvocationContext::CurrentUser(user)) => Ok(user),
        _ => Err(CommandError::message("No calling user is available.")),
    }
}

/// Reads the triggering message out of the bound context.
pub fn triggering_event(
    arguments: &BoundArguments<InvocationContext>,
) -> Result<&ChatMessage, CommandError> {
    match arguments.context(EVENT_CONTEXT) {
        Some(InvocationContext::Event(message)) => Ok(message),
        _ => Err(CommandError::message("No triggering message is available.")),
    }
}
