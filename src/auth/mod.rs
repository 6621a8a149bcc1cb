//! Identity tokens: client-credentials issuance and token sources.

pub mod client_credentials;
pub mod error;
pub mod provider;
pub mod token;

pub use client_credentials::{issue_token, ClientCredentials, ClientCredentialsProvider};
pub use error::AuthError;
pub use provider::{AmbientTokenProvider, StaticTokenProvider, TokenProvider};
pub use token::IssuedToken;
