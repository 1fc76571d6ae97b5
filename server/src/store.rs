//! In-memory conversation history
//!
//! One append-only message sequence per unordered pair of identities. Nothing
//! is ever evicted; history lives as long as the relay process.

use dashmap::DashMap;
use tandem_shared::{ConversationKey, Identity, Message};

/// Message history keyed by conversation
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: DashMap<ConversationKey, Vec<Message>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` to the conversation for `key`, creating it if needed.
    ///
    /// The push happens under the shard's write lock, so concurrent appends
    /// to the same conversation are serialized and never interleave.
    pub fn append(&self, key: ConversationKey, message: Message) {
        self.conversations.entry(key).or_default().push(message);
    }

    /// Every conversation `identity` takes part in, as `(partner, messages)`,
    /// ordered by partner.
    pub fn history_for(&self, identity: &Identity) -> Vec<(Identity, Vec<Message>)> {
        let mut history: Vec<(Identity, Vec<Message>)> = self
            .conversations
            .iter()
            .filter_map(|entry| {
                entry
                    .key()
                    .partner_of(identity)
                    .map(|partner| (partner.clone(), entry.value().clone()))
            })
            .collect();
        history.sort_by(|a, b| a.0.cmp(&b.0));
        history
    }

    /// Snapshot of a single conversation
    pub fn conversation(&self, key: &ConversationKey) -> Option<Vec<Message>> {
        self.conversations.get(key).map(|entry| entry.value().clone())
    }

    /// Number of conversations with at least one message
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
