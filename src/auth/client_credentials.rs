use std::fmt;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;

use super::error::AuthError;
use super::provider::TokenProvider;
use super::token::IssuedToken;
use crate::error::TetherError;
use crate::types::IdentityToken;
use crate::util::retry::RetryPolicy;

const TOKEN_PATH: &str = "oauth2/token";
const DEFAULT_REFRESH_SKEW_SECS: i64 = 60;

/// Client id, secret and issuer for a client-credentials exchange.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Base URL of the identity service (e.g. a Cognito domain).
    pub issuer_url: String,
    /// Requested scopes, sent space-separated when non-empty.
    pub scopes: Vec<String>,
}

impl ClientCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        issuer_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            issuer_url: issuer_url.into(),
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Token endpoint: `{issuer}/oauth2/token`, unless the issuer URL
    /// already points at it.
    pub fn token_url(&self) -> String {
        let base = self.issuer_url.trim_end_matches('/');
        if base.ends_with(TOKEN_PATH) {
            base.to_string()
        } else {
            format!("{base}/{TOKEN_PATH}")
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("issuer_url", &self.issuer_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Issue a token with a single client-credentials request.
///
/// Form-encoded POST with HTTP Basic authentication. A non-2xx response is
/// returned as [`AuthError::Rejected`] carrying the response body.
pub async fn issue_token(
    client: &reqwest::Client,
    credentials: &ClientCredentials,
) -> Result<IssuedToken, AuthError> {
    if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
        return Err(AuthError::MissingCredentials(
            "client id and client secret are required".to_string(),
        ));
    }

    let mut form = vec![("grant_type", "client_credentials".to_string())];
    if !credentials.scopes.is_empty() {
        form.push(("scope", credentials.scopes.join(" ")));
    }

    let resp = client
        .post(credentials.token_url())
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let token: IssuedToken = serde_json::from_str(&body)?;
    if token.access_token.is_empty() {
        return Err(AuthError::InvalidResponse(
            "token response has an empty access_token".to_string(),
        ));
    }
    Ok(token)
}

/// Machine-to-machine token source backed by a client-credentials grant.
///
/// Tokens are cached and reused until they come within the refresh skew of
/// expiry; concurrent callers share one in-flight issuance.
///
/// # Example
/// ```no_run
/// use tether::auth::{ClientCredentials, ClientCredentialsProvider, TokenProvider};
///
/// # async fn example() -> tether::error::Result<()> {
/// let provider = ClientCredentialsProvider::new(ClientCredentials::new(
///     "client-id",
///     "client-secret",
///     "https://example.auth.us-west-2.amazoncognito.com",
/// ));
/// let token = provider.token().await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientCredentialsProvider {
    client: reqwest::Client,
    credentials: ClientCredentials,
    retry: RetryPolicy,
    refresh_skew: Duration,
    cached: Mutex<Option<IssuedToken>>,
}

impl ClientCredentialsProvider {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            retry: RetryPolicy::default(),
            refresh_skew: Duration::seconds(DEFAULT_REFRESH_SKEW_SECS),
            cached: Mutex::new(None),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    /// Request a fresh token, bypassing the cache.
    pub async fn issue(&self) -> Result<IssuedToken, TetherError> {
        let token = self
            .retry
            .execute(|| async {
                issue_token(&self.client, &self.credentials)
                    .await
                    .map_err(TetherError::from)
            })
            .await?;
        tracing::debug!(
            client_id = %self.credentials.client_id,
            expires_in = token.expires_in,
            "Issued identity token"
        );
        Ok(token)
    }

    /// Return the cached token, issuing a new one when missing or near expiry.
    pub async fn current(&self) -> Result<IssuedToken, TetherError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired_within(self.refresh_skew) {
                return Ok(token.clone());
            }
        }
        let token = self.issue().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call issues a new one.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn token(&self) -> Result<IdentityToken, TetherError> {
        Ok(self.current().await?.bearer())
    }
}
