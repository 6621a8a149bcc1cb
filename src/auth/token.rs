use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::types::IdentityToken;

/// Token payload returned by an OAuth2 client-credentials exchange.
///
/// # Example
/// ```
/// use tether::auth::IssuedToken;
///
/// let token: IssuedToken = serde_json::from_str(
///     r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600}"#,
/// )?;
/// assert!(!token.is_expired_within(chrono::Duration::seconds(60)));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip, default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl IssuedToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.expires_in.min(i64::MAX as u64) as i64)
    }

    /// True when the token expires within `skew` from now.
    pub fn is_expired_within(&self, skew: Duration) -> bool {
        Utc::now() + skew >= self.expires_at()
    }

    pub fn bearer(&self) -> IdentityToken {
        IdentityToken::new(self.access_token.clone())
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
