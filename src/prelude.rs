//! Convenience re-exports for common use.

pub use crate::auth::{ClientCredentials, ClientCredentialsProvider, TokenProvider};
pub use crate::backend::{A2aClient, AgentBackend, AgentReply};
pub use crate::config::TetherConfig;
pub use crate::context::{current_identity_token, current_session, with_session, SessionStore};
pub use crate::correlator::{ChatRelay, SessionCorrelator};
pub use crate::error::{Result, TetherError};
pub use crate::gateway::GatewayConnector;
pub use crate::runtime::{AgentFactory, RuntimeRequest, SessionRuntime};
pub use crate::types::{FrontendHandle, IdentityToken, SessionId};
