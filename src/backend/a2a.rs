//! A2A JSON-RPC client for a hosted (or local) agent runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use tokio::sync::OnceCell;

use super::protocol::{
    AgentCard, JsonRpcRequest, JsonRpcResponse, SendMessageResult, AGENT_CARD_PATH,
};
use super::{AgentBackend, AgentReply, NO_RESPONSE, NO_TEXT, SESSION_ID_HEADER};
use crate::auth::{ClientCredentialsProvider, TokenProvider};
use crate::config::TetherConfig;
use crate::error::{Result, TetherError};
use crate::types::SessionId;
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Sends chat messages to an agent runtime over A2A.
///
/// The agent card is fetched on first use and its `url` is cached as the
/// message endpoint; a card without a `url` falls back to the runtime URL.
/// Bearer tokens are only attached to `https` runtimes.
pub struct A2aClient {
    http: reqwest::Client,
    runtime_url: String,
    token_provider: Option<Arc<dyn TokenProvider>>,
    retry: RetryPolicy,
    timeout: Duration,
    endpoint: OnceCell<String>,
}

impl A2aClient {
    pub fn new(runtime_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            runtime_url: runtime_url.into(),
            token_provider: None,
            retry: RetryPolicy::backend(),
            timeout: DEFAULT_TIMEOUT,
            endpoint: OnceCell::new(),
        }
    }

    /// Client for the runtime the configuration points at. Credentials, when
    /// configured, authenticate calls to hosted runtimes.
    pub fn from_config(config: &TetherConfig) -> Result<Self> {
        let mut client = Self::new(config.resolved_runtime_url()).with_timeout(config.request_timeout());
        if config.has_identity_credentials() {
            let provider = ClientCredentialsProvider::new(config.identity_credentials()?);
            client = client.with_token_provider(Arc::new(provider));
        }
        Ok(client)
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn runtime_url(&self) -> &str {
        &self.runtime_url
    }

    fn is_hosted(&self) -> bool {
        self.runtime_url.starts_with("https://")
    }

    async fn headers(&self, session_id: &SessionId) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let session = HeaderValue::from_str(session_id.as_str()).map_err(|_| {
            TetherError::InvalidArgument(format!("session id {session_id} is not a valid header value"))
        })?;
        headers.insert(SESSION_ID_HEADER, session);

        if self.is_hosted() {
            if let Some(provider) = &self.token_provider {
                let token = provider.token().await?;
                let value = HeaderValue::from_str(&token.authorization_header()).map_err(|_| {
                    TetherError::Authentication("token is not a valid header value".into())
                })?;
                headers.insert(AUTHORIZATION, value);
            }
        }
        Ok(headers)
    }

    async fn resolve_endpoint(&self, headers: &HeaderMap) -> Result<String> {
        let endpoint = self
            .endpoint
            .get_or_try_init(|| async {
                let card_url = format!("{}/{AGENT_CARD_PATH}", self.runtime_url.trim_end_matches('/'));
                let response = self
                    .http
                    .get(&card_url)
                    .headers(headers.clone())
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(TetherError::api(status.as_u16(), body));
                }
                let card: AgentCard = serde_json::from_str(&response.text().await?)?;
                tracing::debug!(
                    agent = card.name.as_deref().unwrap_or("unnamed"),
                    version = card.version.as_deref().unwrap_or("unknown"),
                    "Resolved agent card"
                );
                Ok::<_, TetherError>(card.url.unwrap_or_else(|| self.runtime_url.clone()))
            })
            .await?;
        Ok(endpoint.clone())
    }

    async fn exchange(&self, text: &str, session_id: &SessionId) -> Result<String> {
        let headers = self.headers(session_id).await?;
        let endpoint = self.resolve_endpoint(&headers).await?;
        let request = JsonRpcRequest::send_message(text);

        let response = self
            .http
            .post(&endpoint)
            .headers(headers)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TetherError::api(status.as_u16(), body));
        }

        let response: JsonRpcResponse<SendMessageResult> = serde_json::from_str(&body)?;
        if let Some(error) = response.error {
            return Err(TetherError::Backend(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }

        let text = match response.result {
            Some(SendMessageResult::Task(task)) => text_or_placeholder(task.text()),
            Some(SendMessageResult::Message(message)) => text_or_placeholder(message.text()),
            Some(SendMessageResult::Other) | None => NO_RESPONSE.to_string(),
        };
        Ok(text)
    }
}

fn text_or_placeholder(text: String) -> String {
    if text.is_empty() {
        NO_TEXT.to_string()
    } else {
        text
    }
}

#[async_trait]
impl AgentBackend for A2aClient {
    async fn send_message(&self, text: &str, session: Option<&SessionId>) -> Result<AgentReply> {
        let session_id = session.cloned().unwrap_or_else(SessionId::generate);
        tracing::debug!(
            session_id = %session_id,
            new_session = session.is_none(),
            "Sending message to agent"
        );

        let text = self
            .retry
            .execute(|| with_timeout(self.timeout, self.exchange(text, &session_id)))
            .await?;

        Ok(AgentReply { text, session_id })
    }
}

impl std::fmt::Debug for A2aClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2aClient")
            .field("runtime_url", &self.runtime_url)
            .field("authenticated", &self.token_provider.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
