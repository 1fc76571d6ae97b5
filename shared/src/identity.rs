//! Party identities and conversation keys
//!
//! Every username entering the system is case-folded exactly once, when it
//! becomes an [`Identity`]. Maps, comparisons and conversation keys only ever
//! see the folded form, so `Alice` and `alice` are the same party.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// A case-folded username, the unit of addressing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Fold `raw` to lowercase (surrounding whitespace dropped).
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let folded = raw.as_ref().trim().to_lowercase();
        if folded.is_empty() {
            return Err(ProtocolError::EmptyIdentity);
        }
        Ok(Self(folded))
    }

    /// The folded username
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Identity::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl FromStr for Identity {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Identity::new(s)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unordered pair of two distinct identities.
///
/// The pair is stored sorted, so `ConversationKey::new(a, b)` and
/// `ConversationKey::new(b, a)` compare and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    first: Identity,
    second: Identity,
}

impl ConversationKey {
    /// Build the canonical key for a pair. Fails when both sides are the same party.
    pub fn new(a: Identity, b: Identity) -> Result<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { first: a, second: b }),
            std::cmp::Ordering::Greater => Ok(Self { first: b, second: a }),
            std::cmp::Ordering::Equal => Err(ProtocolError::SelfConversation(a.0)),
        }
    }

    /// Both members, lexicographically ordered
    pub fn members(&self) -> (&Identity, &Identity) {
        (&self.first, &self.second)
    }

    /// Whether `identity` is one of the two parties
    pub fn contains(&self, identity: &Identity) -> bool {
        self.first == *identity || self.second == *identity
    }

    /// The other party, if `identity` belongs to this conversation
    pub fn partner_of(&self, identity: &Identity) -> Option<&Identity> {
        if self.first == *identity {
            Some(&self.second)
        } else if self.second == *identity {
            Some(&self.first)
        } else {
            None
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.first, self.second)
    }
}
