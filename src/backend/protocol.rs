//! The slice of the A2A JSON-RPC protocol the client needs.

use serde::{Deserialize, Serialize};

pub const SEND_MESSAGE_METHOD: &str = "message/send";
pub const AGENT_CARD_PATH: &str = ".well-known/agent-card.json";

/// Agent card published by an A2A server.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentCard {
    #[serde(default)]
    pub name: Option<String>,
    /// Endpoint messages should be posted to.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Outbound user message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    kind: &'static str,
    role: Role,
    parts: Vec<Part>,
    message_id: String,
}

impl OutboundMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            kind: "message",
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
            message_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageParams {
    pub message: OutboundMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'static str,
    pub params: P,
}

impl JsonRpcRequest<SendMessageParams> {
    pub fn send_message(text: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: uuid::Uuid::new_v4().to_string(),
            method: SEND_MESSAGE_METHOD,
            params: SendMessageParams {
                message: OutboundMessage::user_text(text),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<R> {
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// Inbound agent message (the `kind` tag is consumed by [`SendMessageResult`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SendMessageResult {
    Task(Task),
    Message(InboundMessage),
    #[serde(other)]
    Other,
}

fn join_text<'a>(parts: impl Iterator<Item = &'a Part>) -> String {
    parts
        .filter_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            Part::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Task {
    /// All text parts across the task's artifacts, newline-joined.
    pub fn text(&self) -> String {
        join_text(self.artifacts.iter().flat_map(|artifact| artifact.parts.iter()))
    }
}

impl InboundMessage {
    pub fn text(&self) -> String {
        join_text(self.parts.iter())
    }
}
