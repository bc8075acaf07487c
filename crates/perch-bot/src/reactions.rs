//! Regex-triggered reactions to ordinary chat messages.

use std::collections::BTreeMap;

use perch_commands::{parse_command, Argument};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
/// One `[[reactions]]` entry in the supplementary config file.
pub struct ReactionConfig {
    pub pattern: String,
    #[serde(default)]
    pub reply_to_self: bool,
    /// Command text (without prefix) run with the pattern's named captures.
    #[serde(default)]
    pub command: Option<String>,
    /// Replies picked at random when no command is configured.
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ReactionError {
    #[error("reaction pattern '{pattern}' is invalid: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("reaction '{pattern}' must set exactly one of `command` or `messages`")]
    Action { pattern: String },
    #[error("reaction '{pattern}' has an unparsable command: {message}")]
    Command { pattern: String, message: String },
}

#[derive(Debug, Clone)]
pub enum ReactionAction {
    Command {
        positional: Vec<Argument>,
        explicit: BTreeMap<String, Argument>,
    },
    Messages(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Reaction {
    regex: Regex,
    reply_to_self: bool,
    action: ReactionAction,
}

impl Reaction {
    pub fn compile(config: &ReactionConfig) -> Result<Self, ReactionError> {
        let regex = Regex::new(&format!("^(?:{})$", config.pattern)).map_err(|source| {
            ReactionError::Pattern {
                pattern: config.pattern.clone(),
                source,
            }
        })?;
        let action = match (&config.command, config.messages.is_empty()) {
            (Some(command), true) => {
                let parsed = parse_command(command).map_err(|error| ReactionError::Command {
                    pattern: config.pattern.clone(),
                    message: error.to_string(),
                })?;
                ReactionAction::Command {
                    positional: parsed.positional,
                    explicit: parsed.explicit,
                }
            }
            (None, false) => ReactionAction::Messages(config.messages.clone()),
            _ => {
                return Err(ReactionError::Action {
                    pattern: config.pattern.clone(),
                })
            }
        };
        Ok(Self {
            regex,
            reply_to_self: config.reply_to_self,
            action,
        })
    }

    pub fn compile_all(configs: &[ReactionConfig]) -> Result<Vec<Self>, ReactionError> {
        configs.iter().map(Self::compile).collect()
    }

    pub fn action(&self) -> &ReactionAction {
        &self.action
    }

    /// Whether this reaction considers a message from `author_id` at all.
    pub fn accepts_author(&self, author_id: u64, bot_user_id: u64) -> bool {
        self.reply_to_self || author_id != bot_user_id
    }

    /// Named captures of a full match, as explicit string arguments.
    /// Groups that did not participate are left out.
    pub fn captures(&self, content: &str) -> Option<BTreeMap<String, Argument>> {
        let captures = self.regex.captures(content)?;
        Some(
            self.regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|value| (name.to_string(), Argument::String(value.as_str().to_string())))
                })
                .collect(),
        )
    }
}
