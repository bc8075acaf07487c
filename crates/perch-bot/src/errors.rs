use perch_access::PermissionError;
use perch_commands::{BindError, ParseError};
use perch_store::StoreError;
use thiserror::Error;

/// Failure raised by an operation body; shown to the caller verbatim.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Binding(#[from] BindError),
    #[error("{}", capitalize(&.0.to_string()))]
    Store(#[from] StoreError),
    #[error("GitHub request failed: {0:#}")]
    Github(anyhow::Error),
}

impl CommandError {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }
}

/// Everything that can stop a command between parsing and invocation.
/// `Display` is the reply posted to the chat room.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Resolution(String),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Binding(#[from] BindError),
    #[error(transparent)]
    Domain(#[from] CommandError),
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
