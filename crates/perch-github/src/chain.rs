//! Reply chains: ordered chat messages whose reply targets may refer to
//! messages posted earlier in the same chain.

use anyhow::Result;
use perch_chat::{ChatRoom, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Where a chain step is threaded.
pub enum ReplyTarget {
    NewThread,
    /// The message posted by the step before this one.
    Previous,
    /// The message posted by the first step of the chain.
    First,
    Message(MessageId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    pub text: String,
    pub target: ReplyTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageChain {
    steps: Vec<ChainStep>,
}

impl MessageChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(text: impl Into<String>) -> Self {
        Self::new().then(text, ReplyTarget::NewThread)
    }

    pub fn then(mut self, text: impl Into<String>, target: ReplyTarget) -> Self {
        self.steps.push(ChainStep {
            text: text.into(),
            target,
        });
        self
    }

    pub fn push(&mut self, text: impl Into<String>, target: ReplyTarget) {
        self.steps.push(ChainStep {
            text: text.into(),
            target,
        });
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Posts every step in order and returns the ids of the posted messages.
///
/// `Previous` and `First` fall back to a new thread when nothing has been
/// posted yet. A send failure aborts the rest of the chain.
pub async fn post_chain(room: &dyn ChatRoom, chain: &MessageChain) -> Result<Vec<MessageId>> {
    let mut posted: Vec<MessageId> = Vec::with_capacity(chain.steps.len());
    for step in &chain.steps {
        let reply_to = match step.target {
            ReplyTarget::NewThread => None,
            ReplyTarget::Previous => posted.last().copied(),
            ReplyTarget::First => posted.first().copied(),
            ReplyTarget::Message(id) => Some(id),
        };
        posted.push(room.send(&step.text, reply_to).await?);
    }
    Ok(posted)
}

#[cfg(test)]
mod tests {
    use perch_chat::{MemoryRoom, MessageId};

    use super::{post_chain, MessageChain, ReplyTarget};

    #[tokio::test]
    async fn functional_post_chain_resolves_targets_from_posted_ids() {
        let room = MemoryRoom::new(1);
        let chain = MessageChain::single("pushed 2 commits")
            .then("first commit", ReplyTarget::First)
            .then("reply to first commit", ReplyTarget::Previous)
            .then("second commit", ReplyTarget::First)
            .then("elsewhere", ReplyTarget::Message(MessageId(77)));

        let ids = post_chain(&room, &chain).await.expect("post");
        let sent = room.sent();
        assert_eq!(ids.len(), 5);
        assert_eq!(sent[0].reply_to, None);
        assert_eq!(sent[1].reply_to, Some(ids[0]));
        assert_eq!(sent[2].reply_to, Some(ids[1]));
        assert_eq!(sent[3].reply_to, Some(ids[0]));
        assert_eq!(sent[4].reply_to, Some(MessageId(77)));
    }

    #[tokio::test]
    async fn unit_post_chain_starts_a_thread_when_nothing_precedes() {
        let room = MemoryRoom::new(1);
        let chain = MessageChain::new().then("orphan", ReplyTarget::Previous);
        post_chain(&room, &chain).await.expect("post");
        assert_eq!(room.sent()[0].reply_to, None);
        assert!(post_chain(&room, &MessageChain::new())
            .await
            .expect("empty")
            .is_empty());
    }
}
