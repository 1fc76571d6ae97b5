//! Static username/password allow-list

use std::collections::BTreeMap;

use subtle::ConstantTimeEq;
use tandem_shared::Identity;

use crate::error::{ClientError, Result};

/// The allow-list consulted at login. Only its identities may log in, and
/// each user's contacts are everyone else on it.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    users: BTreeMap<Identity, String>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        let users = (1..=3)
            .filter_map(|n| {
                let identity = Identity::new(format!("user{}", n)).ok()?;
                Some((identity, format!("pass{}", n)))
            })
            .collect();
        Self { users }
    }
}

impl CredentialStore {
    /// Parse `user:pass,user:pass`
    pub fn parse(raw: &str) -> Result<Self> {
        let mut users = BTreeMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, password) = entry
                .split_once(':')
                .ok_or_else(|| ClientError::Config(format!("Invalid credential entry: {}", entry)))?;
            users.insert(Identity::new(name)?, password.to_string());
        }
        if users.is_empty() {
            return Err(ClientError::Config("credential list is empty".to_string()));
        }
        Ok(Self { users })
    }

    /// Check a login, returning the canonical identity on success
    pub fn verify(&self, username: &str, password: &str) -> Result<Identity> {
        let identity = Identity::new(username).map_err(|_| ClientError::InvalidCredentials)?;
        let expected = self
            .users
            .get(&identity)
            .ok_or(ClientError::InvalidCredentials)?;

        if bool::from(expected.as_bytes().ct_eq(password.as_bytes())) {
            Ok(identity)
        } else {
            Err(ClientError::InvalidCredentials)
        }
    }

    pub fn contacts_for(&self, identity: &Identity) -> Vec<Identity> {
        self.users.keys().filter(|u| *u != identity).cloned().collect()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.users.contains_key(identity)
    }
}
