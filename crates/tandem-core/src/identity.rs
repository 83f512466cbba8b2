//! Identity verification trait.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A verified caller identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    /// Administrator claim from the token verifier.
    #[serde(default)]
    pub is_admin: bool,
}

impl Identity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }
}

/// Verifies a bearer credential and returns the caller's identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Returns the verified identity, or `Unauthorized` for a bad or
    /// missing credential.
    async fn verify(&self, token: &str) -> Result<Identity>;
}
