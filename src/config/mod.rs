//! Configuration loaded from the environment (and `.env`, when present).

use std::fmt;
use std::time::Duration;

use bon::Builder;

use crate::auth::ClientCredentials;
use crate::backend::runtime_url_for_arn;
use crate::context::SessionStore;
use crate::error::{Result, TetherError};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const LOCAL_RUNTIME_URL: &str = "http://localhost:9000/";

const CLIENT_ID: &str = "TETHER_CLIENT_ID";
const CLIENT_SECRET: &str = "TETHER_CLIENT_SECRET";
const ISSUER_URL: &str = "TETHER_ISSUER_URL";
const TOKEN_SCOPES: &str = "TETHER_TOKEN_SCOPES";
const GATEWAY_URL: &str = "TETHER_GATEWAY_URL";
const RUNTIME_URL: &str = "TETHER_RUNTIME_URL";
const AGENT_ARN: &str = "TETHER_AGENT_ARN";
const REGION: &str = "TETHER_REGION";
const SESSION_CAPACITY: &str = "TETHER_SESSION_CAPACITY";
const CHAT_PREAMBLE: &str = "TETHER_CHAT_PREAMBLE";
const REQUEST_TIMEOUT_SECS: &str = "TETHER_REQUEST_TIMEOUT_SECS";

/// Settings shared by the chat front-end and the agent runtime.
///
/// Everything is optional at load time. Accessors for values a component
/// cannot run without (`identity_credentials`, `gateway_url`) return a
/// configuration error, so each side only fails on what it actually uses.
///
/// ```
/// use tether::config::TetherConfig;
///
/// let config = TetherConfig::builder()
///     .runtime_url("http://localhost:9100/")
///     .session_capacity(128)
///     .build();
/// assert_eq!(config.resolved_runtime_url(), "http://localhost:9100/");
/// assert!(!config.is_local());
/// ```
#[derive(Clone, Builder)]
pub struct TetherConfig {
    #[builder(into)]
    client_id: Option<String>,
    #[builder(into)]
    client_secret: Option<String>,
    #[builder(into)]
    issuer_url: Option<String>,
    #[builder(default)]
    token_scopes: Vec<String>,
    #[builder(into)]
    gateway_url: Option<String>,
    #[builder(into)]
    runtime_url: Option<String>,
    #[builder(into)]
    agent_arn: Option<String>,
    #[builder(into, default = DEFAULT_REGION.to_string())]
    region: String,
    session_capacity: Option<usize>,
    #[builder(into)]
    chat_preamble: Option<String>,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for TetherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TetherConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("issuer_url", &self.issuer_url)
            .field("token_scopes", &self.token_scopes)
            .field("gateway_url", &self.gateway_url)
            .field("runtime_url", &self.runtime_url)
            .field("agent_arn", &self.agent_arn)
            .field("region", &self.region)
            .field("session_capacity", &self.session_capacity)
            .field("chat_preamble", &self.chat_preamble)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl TetherConfig {
    /// Load from `TETHER_*` environment variables, reading `.env` first if
    /// one exists.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup. Blank values count as
    /// unset; malformed numbers are configuration errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let session_capacity = match get(SESSION_CAPACITY) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(TetherError::Configuration(format!(
                        "{SESSION_CAPACITY} must be a positive integer, got {raw:?}"
                    )))
                }
                Ok(capacity) => Some(capacity),
            },
            None => None,
        };

        let request_timeout_secs = match get(REQUEST_TIMEOUT_SECS) {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                TetherError::Configuration(format!(
                    "{REQUEST_TIMEOUT_SECS} must be a number of seconds, got {raw:?}"
                ))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let token_scopes = get(TOKEN_SCOPES)
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            client_id: get(CLIENT_ID),
            client_secret: get(CLIENT_SECRET),
            issuer_url: get(ISSUER_URL),
            token_scopes,
            gateway_url: get(GATEWAY_URL),
            runtime_url: get(RUNTIME_URL),
            agent_arn: get(AGENT_ARN),
            region: get(REGION).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            session_capacity,
            chat_preamble: get(CHAT_PREAMBLE),
            request_timeout_secs,
        })
    }

    pub fn has_identity_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.issuer_url.is_some()
    }

    /// Client credentials for the identity service.
    pub fn identity_credentials(&self) -> Result<ClientCredentials> {
        let client_id = require(&self.client_id, CLIENT_ID)?;
        let client_secret = require(&self.client_secret, CLIENT_SECRET)?;
        let issuer_url = require(&self.issuer_url, ISSUER_URL)?;
        Ok(ClientCredentials::new(client_id, client_secret, issuer_url)
            .with_scopes(self.token_scopes.clone()))
    }

    pub fn gateway_url(&self) -> Result<&str> {
        require(&self.gateway_url, GATEWAY_URL)
    }

    /// Where the agent runtime is reached: the ARN-derived invocation URL,
    /// else the explicit runtime URL, else the local default.
    pub fn resolved_runtime_url(&self) -> String {
        if let Some(arn) = &self.agent_arn {
            return runtime_url_for_arn(arn, &self.region);
        }
        self.runtime_url
            .clone()
            .unwrap_or_else(|| LOCAL_RUNTIME_URL.to_string())
    }

    /// True when no remote runtime is configured.
    pub fn is_local(&self) -> bool {
        self.agent_arn.is_none() && self.runtime_url.is_none()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn token_scopes(&self) -> &[String] {
        &self.token_scopes
    }

    pub fn session_capacity(&self) -> Option<usize> {
        self.session_capacity
    }

    pub fn chat_preamble(&self) -> Option<&str> {
        self.chat_preamble.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// An empty session store with the configured capacity bound.
    pub fn session_store<A, G>(&self) -> SessionStore<A, G> {
        match self.session_capacity {
            Some(capacity) => SessionStore::with_capacity(capacity),
            None => SessionStore::new(),
        }
    }
}

fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| TetherError::Configuration(format!("{key} is not set")))
}
