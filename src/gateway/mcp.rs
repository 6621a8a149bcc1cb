//! MCP gateway over streamable HTTP.

use async_trait::async_trait;
use rmcp::{
    model::{ClientInfo, ProtocolVersion},
    service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceError, ServiceExt},
    transport::{
        streamable_http_client::StreamableHttpClientTransportConfig, StreamableHttpClientTransport,
    },
};
use tokio::sync::RwLock;

use super::GatewayConnector;
use crate::error::{Result, TetherError};
use crate::types::IdentityToken;

type GatewaySession = RunningService<RoleClient, Box<dyn DynService<RoleClient>>>;

/// A tool advertised by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Opens MCP sessions against a gateway, authenticated with the caller's
/// bearer token.
///
/// Gateways that reject the current protocol version during the handshake
/// are retried once with 2024-11-05.
#[derive(Debug, Clone, Default)]
pub struct McpGatewayConnector;

impl McpGatewayConnector {
    pub fn new() -> Self {
        Self
    }

    async fn handshake(
        url: &str,
        token: &IdentityToken,
        version: ProtocolVersion,
    ) -> std::result::Result<GatewaySession, ClientInitializeError> {
        let transport = StreamableHttpClientTransport::from_config(
            StreamableHttpClientTransportConfig::with_uri(url.to_string())
                .auth_header(token.secret().to_string()),
        );
        ClientInfo {
            protocol_version: version,
            ..Default::default()
        }
        .into_dyn()
        .serve(transport)
        .await
    }
}

#[async_trait]
impl GatewayConnector for McpGatewayConnector {
    type Client = McpGatewayClient;

    async fn connect(&self, url: &str, token: &IdentityToken) -> Result<McpGatewayClient> {
        let session = match Self::handshake(url, token, ProtocolVersion::LATEST).await {
            Err(error) if rejects_protocol_version(&error) => {
                tracing::debug!(url, "Gateway refused protocol version, retrying with 2024-11-05");
                Self::handshake(url, token, ProtocolVersion::V_2024_11_05).await
            }
            other => other,
        }
        .map_err(handshake_failed)?;

        tracing::info!(url, "Gateway connected");
        Ok(McpGatewayClient {
            url: url.to_string(),
            session: RwLock::new(Some(session)),
        })
    }

    async fn disconnect(&self, client: &McpGatewayClient) -> Result<()> {
        client.close().await
    }
}

/// An initialized MCP session with the gateway.
pub struct McpGatewayClient {
    url: String,
    session: RwLock<Option<GatewaySession>>,
}

impl McpGatewayClient {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn is_closed(&self) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .map_or(true, |session| session.is_closed())
    }

    /// Every tool the gateway advertises, across all pages.
    pub async fn list_tools(&self) -> Result<Vec<GatewayTool>> {
        let guard = self.session.read().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| TetherError::Gateway(format!("session with {} is closed", self.url)))?;
        let tools = session
            .list_all_tools()
            .await
            .map_err(|error| request_failed("tools/list", error))?;
        Ok(tools.into_iter().map(GatewayTool::from).collect())
    }

    /// Shut the session down. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        session
            .cancel()
            .await
            .map_err(|error| TetherError::Gateway(format!("closing session with {}: {error}", self.url)))?;
        tracing::debug!(url = %self.url, "Gateway session closed");
        Ok(())
    }
}

impl std::fmt::Debug for McpGatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpGatewayClient").field("url", &self.url).finish()
    }
}

impl From<rmcp::model::Tool> for GatewayTool {
    fn from(tool: rmcp::model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.map(|text| text.to_string()),
            input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
        }
    }
}

/// The gateway answered the handshake with an error naming the protocol
/// version.
fn rejects_protocol_version(error: &ClientInitializeError) -> bool {
    let ClientInitializeError::JsonRpcError(error) = error else {
        return false;
    };
    let message = error.message.to_ascii_lowercase();
    message.contains("protocol") && message.contains("version")
}

fn handshake_failed(error: ClientInitializeError) -> TetherError {
    match error {
        ClientInitializeError::Cancelled => TetherError::Cancelled,
        ClientInitializeError::JsonRpcError(error) => TetherError::Gateway(format!(
            "gateway refused handshake ({}): {}",
            error.code.0, error.message
        )),
        other => TetherError::Gateway(format!("gateway handshake failed: {other}")),
    }
}

fn request_failed(method: &str, error: ServiceError) -> TetherError {
    match error {
        ServiceError::Timeout { timeout } => {
            TetherError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
        }
        ServiceError::McpError(error) => TetherError::Gateway(format!(
            "{method} rejected ({}): {}",
            error.code.0, error.message
        )),
        other => TetherError::Gateway(format!("{method} failed: {other}")),
    }
}
