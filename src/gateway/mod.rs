//! Capability gateway connections.
//!
//! A gateway is the tool server an agent calls out to. Connecting is a
//! network handshake authenticated with a bearer token; the session store
//! caches the resulting client per session.

#[cfg(feature = "mcp")]
pub mod mcp;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::IdentityToken;
use crate::util::retry::RetryPolicy;

/// Opens clients to a capability gateway.
///
/// `connect` must be safe to call again after a failure; nothing is cached
/// by the connector itself.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    type Client: Send + Sync + 'static;

    async fn connect(&self, url: &str, token: &IdentityToken) -> Result<Self::Client>;

    /// Release a client's connection. The default does nothing.
    async fn disconnect(&self, _client: &Self::Client) -> Result<()> {
        Ok(())
    }
}

/// Retries a connector's handshake with bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryingConnector<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingConnector<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: GatewayConnector> GatewayConnector for RetryingConnector<C> {
    type Client = C::Client;

    async fn connect(&self, url: &str, token: &IdentityToken) -> Result<Self::Client> {
        self.policy.execute(|| self.inner.connect(url, token)).await
    }

    async fn disconnect(&self, client: &Self::Client) -> Result<()> {
        self.inner.disconnect(client).await
    }
}
