use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{lock_unpoisoned, ChatMessage, ChatRoom, MessageId, EVENT_CHANNEL_CAPACITY};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outbound message recorded by [`MemoryRoom`].
pub struct SentMessage {
    pub message_id: MessageId,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

/// Room that keeps everything in memory; used by tests and local tooling.
#[derive(Debug)]
pub struct MemoryRoom {
    bot_user_id: u64,
    sender: mpsc::Sender<ChatMessage>,
    receiver: Mutex<Option<mpsc::Receiver<ChatMessage>>>,
    state: Mutex<MemoryRoomState>,
}

#[derive(Debug, Default)]
struct MemoryRoomState {
    next_message_id: u64,
    plain_text: HashMap<MessageId, String>,
    sent: Vec<SentMessage>,
}

impl MemoryRoom {
    pub fn new(bot_user_id: u64) -> Self {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            bot_user_id,
            sender,
            receiver: Mutex::new(Some(receiver)),
            state: Mutex::new(MemoryRoomState::default()),
        }
    }

    fn allocate_id(&self) -> MessageId {
        let mut state = lock_unpoisoned(&self.state);
        state.next_message_id += 1;
        MessageId(state.next_message_id)
    }

    /// Posts a message from another user whose rendered and plain text agree.
    pub async fn inject(&self, user_id: u64, user_name: &str, text: &str) -> Result<MessageId> {
        self.inject_rendered(user_id, user_name, text, text).await
    }

    /// Posts a message whose rendered content differs from its source text.
    pub async fn inject_rendered(
        &self,
        user_id: u64,
        user_name: &str,
        rendered: &str,
        plain: &str,
    ) -> Result<MessageId> {
        let message_id = self.allocate_id();
        lock_unpoisoned(&self.state)
            .plain_text
            .insert(message_id, plain.to_string());
        self.sender
            .send(ChatMessage {
                message_id,
                user_id,
                user_name: user_name.to_string(),
                content: rendered.to_string(),
            })
            .await
            .map_err(|_| anyhow!("memory room event stream is closed"))?;
        Ok(message_id)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock_unpoisoned(&self.state).sent.clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        lock_unpoisoned(&self.state)
            .sent
            .iter()
            .map(|message| message.text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatRoom for MemoryRoom {
    fn bot_user_id(&self) -> u64 {
        self.bot_user_id
    }

    fn subscribe(&self) -> Result<mpsc::Receiver<ChatMessage>> {
        match lock_unpoisoned(&self.receiver).take() {
            Some(receiver) => Ok(receiver),
            None => bail!("memory room events were already subscribed"),
        }
    }

    async fn fetch_plain_text(&self, message_id: MessageId) -> Result<String> {
        lock_unpoisoned(&self.state)
            .plain_text
            .get(&message_id)
            .cloned()
            .ok_or_else(|| anyhow!("message {message_id} does not exist"))
    }

    async fn send(&self, text: &str, reply_to: Option<MessageId>) -> Result<MessageId> {
        let message_id = self.allocate_id();
        let mut state = lock_unpoisoned(&self.state);
        state.plain_text.insert(message_id, text.to_string());
        state.sent.push(SentMessage {
            message_id,
            text: text.to_string(),
            reply_to,
        });
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryRoom, SentMessage};
    use crate::{ChatRoom, MessageId};

    #[tokio::test]
    async fn functional_memory_room_delivers_injected_messages_in_order() {
        let room = MemoryRoom::new(1);
        let mut events = room.subscribe().expect("subscribe");
        let first = room.inject(5, "erin", "hello").await.expect("inject");
        let second = room
            .inject_rendered(5, "erin", "<b>bold</b>", "**bold**")
            .await
            .expect("inject");

        let event = events.recv().await.expect("first event");
        assert_eq!(event.message_id, first);
        assert_eq!(event.content, "hello");
        let event = events.recv().await.expect("second event");
        assert_eq!(event.content, "<b>bold</b>");
        assert_eq!(
            room.fetch_plain_text(second).await.expect("plain"),
            "**bold**"
        );
    }

    #[tokio::test]
    async fn functional_memory_room_records_sent_messages_with_fresh_ids() {
        let room = MemoryRoom::new(1);
        let first = room.send("one", None).await.expect("send");
        let second = room.send("two", Some(first)).await.expect("send");
        assert_ne!(first, second);
        assert_eq!(
            room.sent(),
            vec![
                SentMessage {
                    message_id: first,
                    text: "one".into(),
                    reply_to: None
                },
                SentMessage {
                    message_id: second,
                    text: "two".into(),
                    reply_to: Some(first)
                },
            ]
        );
    }

    #[tokio::test]
    async fn regression_memory_room_subscribes_once_and_rejects_unknown_ids() {
        let room = MemoryRoom::new(1);
        room.subscribe().expect("first subscribe");
        assert!(room.subscribe().is_err());
        assert!(room.fetch_plain_text(MessageId(99)).await.is_err());
    }
}
