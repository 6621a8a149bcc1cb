use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ambient;
use crate::error::TetherError;
use crate::types::IdentityToken;

/// Source of bearer tokens for outbound calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<IdentityToken, TetherError>;
}

/// Always hands out the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: IdentityToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<IdentityToken>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<IdentityToken, TetherError> {
        Ok(self.token.clone())
    }
}

/// Uses the identity token of the current request, if one is in scope.
///
/// Falls back to another provider when the request carries no token; with no
/// fallback, a missing token is an authentication error.
#[derive(Clone, Default)]
pub struct AmbientTokenProvider {
    fallback: Option<Arc<dyn TokenProvider>>,
}

impl AmbientTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn TokenProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl TokenProvider for AmbientTokenProvider {
    async fn token(&self) -> Result<IdentityToken, TetherError> {
        if let Some(token) = ambient::current_identity_token() {
            return Ok(token);
        }
        match &self.fallback {
            Some(fallback) => fallback.token().await,
            None => Err(TetherError::Authentication(
                "no identity token in request context".into(),
            )),
        }
    }
}
