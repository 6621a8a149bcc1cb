//! Agent backend boundary: the call the front-end side makes for each chat
//! message, and its A2A implementation.

pub mod a2a;
pub mod protocol;

pub use a2a::A2aClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::SessionId;

/// Header carrying the backend session id on every A2A request and on
/// every runtime invocation.
pub const SESSION_ID_HEADER: &str = "x-amzn-bedrock-agentcore-runtime-session-id";

/// Reply text when the backend returned a task without any text parts.
pub const NO_TEXT: &str = "No text found in task result.";

/// Reply text when the backend returned neither a task nor a message.
pub const NO_RESPONSE: &str = "No response from agent.";

/// One completed exchange with the agent backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    /// The session the backend served; always concrete, even when the
    /// request carried none.
    pub session_id: SessionId,
}

/// A conversational agent reachable by sending it text.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Send `text` within `session`, or start a new backend session when
    /// `session` is `None`.
    async fn send_message(&self, text: &str, session: Option<&SessionId>) -> Result<AgentReply>;
}

/// Invocation URL of a hosted agent runtime, from its ARN.
///
/// The ARN is percent-encoded as a single path segment (`:` and `/`
/// included).
pub fn runtime_url_for_arn(arn: &str, region: &str) -> String {
    format!(
        "https://bedrock-agentcore.{region}.amazonaws.com/runtimes/{}/invocations/",
        urlencoding::encode(arn)
    )
}
