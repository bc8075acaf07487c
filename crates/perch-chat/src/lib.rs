//! Chat room collaborator used by the dispatcher and the webhook reporter.
//!
//! A room delivers inbound messages over a single ordered channel and posts
//! outbound messages, optionally as replies to earlier ones.

use std::fmt;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

mod console;
mod memory;

pub use console::{ConsoleRoom, ConsoleRoomConfig};
pub use memory::{MemoryRoom, SentMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Identifier of a message posted in the room.
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Inbound message event. `content` is the rendered text as the room shows it.
pub struct ChatMessage {
    pub message_id: MessageId,
    pub user_id: u64,
    pub user_name: String,
    pub content: String,
}

#[async_trait]
pub trait ChatRoom: Send + Sync {
    /// Chat identity the bot posts as.
    fn bot_user_id(&self) -> u64;

    /// Hands out the inbound event stream. Only the first call succeeds.
    fn subscribe(&self) -> Result<mpsc::Receiver<ChatMessage>>;

    /// Returns the unrendered source text of a message.
    async fn fetch_plain_text(&self, message_id: MessageId) -> Result<String>;

    /// Posts `text`, threaded under `reply_to` when given.
    async fn send(&self, text: &str, reply_to: Option<MessageId>) -> Result<MessageId>;
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
