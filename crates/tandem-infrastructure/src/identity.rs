//! Static token-table identity verifier for tests and single-node
//! deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use tandem_core::error::{Result, TandemError};
use tandem_core::identity::{Identity, IdentityVerifier};

/// Maps bearer tokens to verified identities.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for a regular user.
    pub fn with_user(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), Identity::user(user_id));
        self
    }

    /// Registers a token carrying the administrator claim.
    pub fn with_admin(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), Identity::admin(user_id));
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity> {
        if token.is_empty() {
            return Err(TandemError::unauthorized("missing credential"));
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| TandemError::unauthorized("unknown credential"))
    }
}
