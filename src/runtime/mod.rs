//! Agent-runtime side: per-request session dispatch.
//!
//! Every inbound invocation names its backend session in a header. The
//! runtime makes that session (and the caller's workload token) ambient,
//! makes sure the session has a gateway client and an agent, and hands the
//! agent to the request handler.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::auth::{ClientCredentialsProvider, TokenProvider};
use crate::config::TetherConfig;
use crate::context::{ambient, RequestContext, SessionStore};
use crate::error::{Result, TetherError};
use crate::gateway::GatewayConnector;
use crate::types::{IdentityToken, SessionId};

pub use crate::backend::SESSION_ID_HEADER;

pub const WORKLOAD_TOKEN_HEADER: &str = "x-amzn-bedrock-agentcore-runtime-workload-accesstoken";

/// What the runtime needs from one inbound invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeRequest {
    pub session_id: Option<SessionId>,
    pub workload_token: Option<IdentityToken>,
}

impl RuntimeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_workload_token(mut self, token: impl Into<IdentityToken>) -> Self {
        self.workload_token = Some(token.into());
        self
    }

    /// Extract the request from header name/value pairs. Names match
    /// case-insensitively; empty values count as absent.
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = Self::default();
        for (name, value) in headers {
            let name = name.as_ref();
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            if name.eq_ignore_ascii_case(SESSION_ID_HEADER) {
                request.session_id = Some(SessionId::new(value));
            } else if name.eq_ignore_ascii_case(WORKLOAD_TOKEN_HEADER) {
                request.workload_token = Some(IdentityToken::new(value));
            }
        }
        request
    }

    /// [`from_headers`](Self::from_headers) for an HTTP header map; values
    /// that are not visible ASCII are skipped.
    pub fn from_header_map(headers: &reqwest::header::HeaderMap) -> Self {
        Self::from_headers(
            headers
                .iter()
                .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
        )
    }
}

/// Builds the agent for a session once its gateway client is connected.
#[async_trait]
pub trait AgentFactory<G: Send + Sync + 'static>: Send + Sync {
    type Agent: Send + Sync + 'static;

    async fn build(&self, session_id: &SessionId, gateway: Arc<G>) -> Result<Self::Agent>;
}

/// Dispatches runtime invocations to per-session agents.
pub struct SessionRuntime<C, F>
where
    C: GatewayConnector,
    F: AgentFactory<C::Client>,
{
    store: Arc<SessionStore<F::Agent, C::Client>>,
    connector: C,
    agents: F,
    tokens: Arc<dyn TokenProvider>,
    gateway_url: String,
    local: bool,
}

impl<C, F> SessionRuntime<C, F>
where
    C: GatewayConnector,
    F: AgentFactory<C::Client>,
{
    pub fn new(
        connector: C,
        agents: F,
        tokens: Arc<dyn TokenProvider>,
        gateway_url: impl Into<String>,
    ) -> Self {
        Self {
            store: Arc::new(SessionStore::new()),
            connector,
            agents,
            tokens,
            gateway_url: gateway_url.into(),
            local: false,
        }
    }

    /// Runtime wired from configuration: gateway tokens come from the
    /// client-credentials flow, the store honours the configured capacity.
    pub fn from_config(config: &TetherConfig, connector: C, agents: F) -> Result<Self> {
        let tokens = ClientCredentialsProvider::new(config.identity_credentials()?);
        Ok(Self::new(connector, agents, Arc::new(tokens), config.gateway_url()?)
            .with_store(Arc::new(config.session_store()))
            .with_local(config.is_local()))
    }

    pub fn with_store(mut self, store: Arc<SessionStore<F::Agent, C::Client>>) -> Self {
        self.store = store;
        self
    }

    /// When local, invocations without a session id get a fresh one instead
    /// of being rejected.
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore<F::Agent, C::Client>> {
        &self.store
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn agent_factory(&self) -> &F {
        &self.agents
    }

    /// Run `handler` with the agent of the request's session.
    ///
    /// The session id and workload token stay ambient for the whole call.
    /// A request without a session id fails with
    /// [`TetherError::NotInitialized`] unless the runtime is local.
    pub async fn dispatch<H, Fut, T>(&self, request: RuntimeRequest, handler: H) -> Result<T>
    where
        H: FnOnce(Arc<F::Agent>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session_id = match request.session_id {
            Some(id) => id,
            None if self.local => {
                let id = SessionId::generate();
                tracing::info!(session_id = %id, "No session id on local request, generated one");
                id
            }
            None => {
                return Err(TetherError::NotInitialized(
                    "Waiting for session ID to initialize agent".into(),
                ))
            }
        };

        let mut context = RequestContext::new().with_session_id(session_id.clone());
        if let Some(token) = request.workload_token {
            context = context.with_identity_token(token);
        }

        ambient::with_context(context, async {
            let agent = self.agent_for(&session_id).await?;
            handler(agent).await
        })
        .await
    }

    /// The session's agent, connecting the gateway and building the agent
    /// on first use.
    pub async fn agent_for(&self, session_id: &SessionId) -> Result<Arc<F::Agent>> {
        let gateway = self
            .store
            .get_or_create_gateway_client(session_id, || async {
                tracing::info!(session_id = %session_id.short(), "Connecting gateway client");
                let token = self.tokens.token().await?;
                self.connector.connect(&self.gateway_url, &token).await
            })
            .await?;

        if self.store.gateway_url(session_id).await.is_none() {
            self.store
                .set_gateway_url(session_id, self.gateway_url.clone())
                .await;
        }

        self.store
            .get_or_create_agent(session_id, || async {
                tracing::info!(session_id = %session_id.short(), "Building agent");
                self.agents.build(session_id, gateway).await
            })
            .await
    }

    /// Tear the session down and disconnect its gateway client.
    ///
    /// Returns `false` when the session did not exist.
    pub async fn end_session(&self, session_id: &SessionId) -> Result<bool> {
        let Some(record) = self.store.teardown(session_id).await else {
            return Ok(false);
        };
        if let Some(client) = record.into_gateway_client() {
            self.connector.disconnect(&client).await?;
        }
        Ok(true)
    }

    /// End every session concurrently. All sessions are attempted; the
    /// first error is returned.
    pub async fn shutdown(&self) -> Result<()> {
        let session_ids = self.store.session_ids();
        let results = join_all(session_ids.iter().map(|id| self.end_session(id))).await;

        let mut first_error = None;
        for (session_id, result) in session_ids.iter().zip(results) {
            if let Err(error) = result {
                tracing::warn!(session_id = %session_id, error = %error, "Failed to end session");
                first_error.get_or_insert(error);
            }
        }
        tracing::info!(sessions = session_ids.len(), "Session runtime shut down");
        first_error.map_or(Ok(()), Err)
    }
}
