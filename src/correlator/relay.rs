use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::SessionCorrelator;
use crate::backend::{A2aClient, AgentBackend};
use crate::config::TetherConfig;
use crate::error::Result;
use crate::types::FrontendHandle;

/// The UI-facing entry point: one call per submitted chat message.
pub struct ChatRelay {
    backend: Arc<dyn AgentBackend>,
    correlator: SessionCorrelator,
    preamble: Option<String>,
}

impl ChatRelay {
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        Self {
            backend,
            correlator: SessionCorrelator::new(),
            preamble: None,
        }
    }

    /// Relay backed by an [`A2aClient`] for the configured runtime.
    pub fn from_config(config: &TetherConfig) -> Result<Self> {
        let backend = A2aClient::from_config(config)?;
        let mut relay = Self::new(Arc::new(backend));
        if let Some(preamble) = config.chat_preamble() {
            relay = relay.with_preamble(preamble);
        }
        Ok(relay)
    }

    /// Text prepended (on its own line) to every message before it is sent.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn correlator(&self) -> &SessionCorrelator {
        &self.correlator
    }

    /// Relay `text` for `handle` and return the assistant's reply text.
    pub async fn handle_message(&self, handle: &FrontendHandle, text: &str) -> Result<String> {
        let message = self.compose(text);
        let reply = self
            .correlator
            .exchange(self.backend.as_ref(), handle, &message)
            .await?;
        Ok(reply.text)
    }

    /// [`handle_message`](Self::handle_message), abandoned when `cancel`
    /// fires (for example when the UI connection goes away).
    pub async fn handle_message_cancellable(
        &self,
        handle: &FrontendHandle,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let message = self.compose(text);
        let reply = self
            .correlator
            .exchange_cancellable(self.backend.as_ref(), handle, &message, cancel)
            .await?;
        Ok(reply.text)
    }

    fn compose(&self, text: &str) -> String {
        match &self.preamble {
            Some(preamble) => format!("{preamble}\n{text}"),
            None => text.to_string(),
        }
    }
}
