use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::model::MerchantId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Resolves an opaque merchant credential. Issuing credentials happens elsewhere.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_token(&self, token: &str) -> Result<MerchantId, IdentityError>;
}

/// Fixed token table, for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticTokens {
    tokens: DashMap<String, MerchantId>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: impl Into<String>, merchant_id: MerchantId) -> Self {
        self.tokens.insert(token.into(), merchant_id);
        self
    }

    pub fn insert(&self, token: impl Into<String>, merchant_id: MerchantId) {
        self.tokens.insert(token.into(), merchant_id);
    }

    /// Returns true if the token was known.
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }
}

#[async_trait]
impl IdentityResolver for StaticTokens {
    async fn resolve_token(&self, token: &str) -> Result<MerchantId, IdentityError> {
        self.tokens
            .get(token)
            .map(|e| e.value().clone())
            .ok_or(IdentityError::Unauthorized)
    }
}
