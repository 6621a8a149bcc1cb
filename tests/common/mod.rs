//! Shared test helpers: a scripted agent backend, a counting gateway
//! connector and a fake agent factory.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tether::backend::{AgentBackend, AgentReply};
use tether::error::{Result, TetherError};
use tether::gateway::GatewayConnector;
use tether::runtime::AgentFactory;
use tether::types::{IdentityToken, SessionId};

/// One recorded `send_message` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub text: String,
    pub session: Option<SessionId>,
}

/// Backend that echoes messages and allocates session ids on demand.
///
/// New sessions take ids from the queue set with `queue_new_session`, then
/// fall back to `sess-<n>`.
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<SentMessage>>,
    new_sessions: Mutex<VecDeque<SessionId>>,
    allocated: AtomicUsize,
    fail_next: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_new_session(&self, id: &str) {
        self.new_sessions
            .lock()
            .unwrap()
            .push_back(SessionId::new(id));
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SentMessage> {
        self.calls.lock().unwrap().clone()
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentBackend for MockBackend {
    async fn send_message(&self, text: &str, session: Option<&SessionId>) -> Result<AgentReply> {
        self.calls.lock().unwrap().push(SentMessage {
            text: text.to_string(),
            session: session.cloned(),
        });
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TetherError::Backend("scripted failure".into()));
        }

        let session_id = match session {
            Some(id) => id.clone(),
            None => {
                let n = self.allocated.fetch_add(1, Ordering::SeqCst);
                self.new_sessions
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| SessionId::new(format!("sess-{n}")))
            }
        };
        Ok(AgentReply {
            text: format!("echo: {text}"),
            session_id,
        })
    }
}

/// Client handed out by [`CountingConnector`].
#[derive(Debug)]
pub struct FakeGateway {
    pub serial: usize,
    pub url: String,
    pub token: IdentityToken,
}

/// Connector that counts handshakes and disconnects.
#[derive(Default)]
pub struct CountingConnector {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next `n` handshakes fail.
    pub fn fail_times(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayConnector for CountingConnector {
    type Client = FakeGateway;

    async fn connect(&self, url: &str, token: &IdentityToken) -> Result<FakeGateway> {
        let serial = self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TetherError::Gateway("handshake refused".into()));
        }
        Ok(FakeGateway {
            serial,
            url: url.to_string(),
            token: token.clone(),
        })
    }

    async fn disconnect(&self, _client: &FakeGateway) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Agent built by [`FakeAgentFactory`].
#[derive(Debug)]
pub struct FakeAgent {
    pub session_id: SessionId,
    pub gateway: Arc<FakeGateway>,
}

#[derive(Default)]
pub struct FakeAgentFactory {
    builds: AtomicUsize,
}

impl FakeAgentFactory {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentFactory<FakeGateway> for FakeAgentFactory {
    type Agent = FakeAgent;

    async fn build(&self, session_id: &SessionId, gateway: Arc<FakeGateway>) -> Result<FakeAgent> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(FakeAgent {
            session_id: session_id.clone(),
            gateway,
        })
    }
}
