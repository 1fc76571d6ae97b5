//! Presentation-side conversation cache

use std::collections::HashMap;

use tandem_shared::{ClientFrame, ConversationKey, Identity, Message, ServerEvent};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::queue::OutgoingQueue;

/// How a relay event changed the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// One message appended to the conversation
    Appended(ConversationKey),
    /// The whole conversation replaced by a replay
    Replaced(ConversationKey),
}

impl ChatUpdate {
    pub fn key(&self) -> &ConversationKey {
        match self {
            ChatUpdate::Appended(key) | ChatUpdate::Replaced(key) => key,
        }
    }
}

/// What the presentation layer knows about its conversations.
///
/// Filled from relay events only; never reads the connection itself.
pub struct ChatState {
    identity: Identity,
    selected_partner: Option<Identity>,
    conversations: HashMap<ConversationKey, Vec<Message>>,
    outgoing: OutgoingQueue,
}

impl ChatState {
    pub fn new(identity: Identity, outgoing: OutgoingQueue) -> Self {
        Self {
            identity,
            selected_partner: None,
            conversations: HashMap::new(),
            outgoing,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn selected_partner(&self) -> Option<&Identity> {
        self.selected_partner.as_ref()
    }

    /// Switch the active conversation. A change of partner asks the relay for
    /// that conversation's history.
    pub fn select_partner(&mut self, partner: Identity) -> Result<()> {
        if partner == self.identity {
            return Err(tandem_shared::ProtocolError::SelfConversation(partner.to_string()).into());
        }
        if self.selected_partner.as_ref() == Some(&partner) {
            return Ok(());
        }

        self.outgoing.push(ClientFrame::GetHistory {
            partner: partner.clone(),
        });
        self.selected_partner = Some(partner);
        Ok(())
    }

    /// Echo `text` locally and queue it for the selected partner
    pub fn compose(&mut self, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let receiver = self
            .selected_partner
            .clone()
            .ok_or(ClientError::NoPartnerSelected)?;

        let key = ConversationKey::new(self.identity.clone(), receiver.clone())?;
        let echo = Message::new(self.identity.clone(), text);
        self.conversations.entry(key).or_default().push(echo.clone());

        self.outgoing.push(ClientFrame::Send {
            sender: Some(self.identity.clone()),
            receiver,
            message: text.to_string(),
        });
        Ok(echo)
    }

    /// Fold a relay event into the cache. Returns how the cache changed, if
    /// at all.
    pub fn apply(&mut self, event: ServerEvent) -> Option<ChatUpdate> {
        match event {
            ServerEvent::NewMessage { message } => {
                if message.sender == self.identity {
                    return None;
                }
                let key = ConversationKey::new(message.sender.clone(), self.identity.clone()).ok()?;
                self.conversations.entry(key.clone()).or_default().push(message);
                Some(ChatUpdate::Appended(key))
            }
            ServerEvent::InitialMessages { partner, messages } => {
                let key = ConversationKey::new(partner, self.identity.clone()).ok()?;
                debug!("Loaded {} messages for {}", messages.len(), key);
                self.conversations.insert(key.clone(), messages);
                Some(ChatUpdate::Replaced(key))
            }
            ServerEvent::Unknown => None,
        }
    }

    /// Cached messages exchanged with `partner`, oldest first
    pub fn conversation_with(&self, partner: &Identity) -> &[Message] {
        ConversationKey::new(self.identity.clone(), partner.clone())
            .ok()
            .and_then(|key| self.conversations.get(&key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Messages an update brought in: the appended one, or the whole
    /// replayed conversation
    pub fn changed_messages(&self, update: &ChatUpdate) -> &[Message] {
        let messages = self
            .conversations
            .get(update.key())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        match update {
            ChatUpdate::Appended(_) => &messages[messages.len().saturating_sub(1)..],
            ChatUpdate::Replaced(_) => messages,
        }
    }

    /// Partners with at least one cached conversation, sorted
    pub fn partners(&self) -> Vec<Identity> {
        let mut partners: Vec<Identity> = self
            .conversations
            .keys()
            .filter_map(|key| key.partner_of(&self.identity).cloned())
            .collect();
        partners.sort();
        partners
    }
}
