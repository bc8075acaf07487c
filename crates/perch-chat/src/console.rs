use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::{lock_unpoisoned, ChatMessage, ChatRoom, MessageId, EVENT_CHANNEL_CAPACITY};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Identities used by the console transport.
pub struct ConsoleRoomConfig {
    pub bot_user_id: u64,
    /// Chat identity attributed to every line read from stdin.
    pub operator_user_id: u64,
    pub operator_name: String,
}

/// Local operator transport: stdin lines in, stdout lines out.
#[derive(Debug)]
pub struct ConsoleRoom {
    config: ConsoleRoomConfig,
    next_message_id: Arc<AtomicU64>,
    /// Stdin lines not yet read back by `fetch_plain_text`.
    plain_text: Arc<Mutex<HashMap<MessageId, String>>>,
    subscribed: Mutex<bool>,
}

impl ConsoleRoom {
    pub fn new(config: ConsoleRoomConfig) -> Self {
        Self {
            config,
            next_message_id: Arc::new(AtomicU64::new(1)),
            plain_text: Arc::new(Mutex::new(HashMap::new())),
            subscribed: Mutex::new(false),
        }
    }
}

fn format_outbound(message_id: MessageId, text: &str, reply_to: Option<MessageId>) -> String {
    match reply_to {
        Some(parent) => format!("[#{message_id} > #{parent}] {text}\n"),
        None => format!("[#{message_id}] {text}\n"),
    }
}

#[async_trait]
impl ChatRoom for ConsoleRoom {
    fn bot_user_id(&self) -> u64 {
        self.config.bot_user_id
    }

    fn subscribe(&self) -> Result<mpsc::Receiver<ChatMessage>> {
        let mut subscribed = lock_unpoisoned(&self.subscribed);
        if *subscribed {
            bail!("console room events were already subscribed");
        }
        *subscribed = true;

        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let config = self.config.clone();
        let next_message_id = Arc::clone(&self.next_message_id);
        let plain_text = Arc::clone(&self.plain_text);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(%error, "failed to read console input");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let message_id = MessageId(next_message_id.fetch_add(1, Ordering::Relaxed));
                lock_unpoisoned(&plain_text).insert(message_id, line.clone());
                let event = ChatMessage {
                    message_id,
                    user_id: config.operator_user_id,
                    user_name: config.operator_name.clone(),
                    content: line,
                };
                if sender.send(event).await.is_err() {
                    break;
                }
            }
            tracing::debug!("console input closed");
        });
        Ok(receiver)
    }

    /// Each inbound line can be read back once.
    async fn fetch_plain_text(&self, message_id: MessageId) -> Result<String> {
        lock_unpoisoned(&self.plain_text)
            .remove(&message_id)
            .ok_or_else(|| anyhow!("message {message_id} has no pending plain text"))
    }

    async fn send(&self, text: &str, reply_to: Option<MessageId>) -> Result<MessageId> {
        let message_id = MessageId(self.next_message_id.fetch_add(1, Ordering::Relaxed));
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format_outbound(message_id, text, reply_to).as_bytes())
            .await
            .context("failed to write chat message to stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{format_outbound, ConsoleRoom, ConsoleRoomConfig};
    use crate::{lock_unpoisoned, ChatRoom, MessageId};

    fn room() -> ConsoleRoom {
        ConsoleRoom::new(ConsoleRoomConfig {
            bot_user_id: 1,
            operator_user_id: 2,
            operator_name: "operator".into(),
        })
    }

    #[test]
    fn unit_format_outbound_marks_reply_targets() {
        assert_eq!(format_outbound(MessageId(4), "hi", None), "[#4] hi\n");
        assert_eq!(
            format_outbound(MessageId(5), "re", Some(MessageId(4))),
            "[#5 > #4] re\n"
        );
    }

    #[tokio::test]
    async fn regression_console_room_releases_plain_text_after_fetch() {
        let room = room();
        lock_unpoisoned(&room.plain_text).insert(MessageId(3), "!!/help".to_string());
        assert_eq!(
            room.fetch_plain_text(MessageId(3)).await.expect("plain"),
            "!!/help"
        );
        assert!(lock_unpoisoned(&room.plain_text).is_empty());
        assert!(room.fetch_plain_text(MessageId(3)).await.is_err());
    }

    #[tokio::test]
    async fn functional_console_room_does_not_retain_sent_text() {
        let room = room();
        let id = room.send("pushed 2 commits", None).await.expect("send");
        assert!(room.fetch_plain_text(id).await.is_err());
        assert_eq!(room.bot_user_id(), 1);
    }
}
