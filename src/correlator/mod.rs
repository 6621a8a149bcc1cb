//! Front-end conversation handle → backend session correlation.

pub mod relay;

pub use relay::ChatRelay;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

use crate::backend::{AgentBackend, AgentReply};
use crate::error::{Result, TetherError};
use crate::types::{FrontendHandle, SessionId};

/// Remembers which backend session each front-end conversation talks to.
///
/// The first message of a handle goes out without a session, and whatever
/// id the backend answers with is recorded for the next one. Messages for
/// the same handle are serialized, so a second message sent before the
/// first reply arrives waits and reuses the reply's session instead of
/// opening a divergent one. Different handles never wait on each other.
///
/// This registry is independent of [`SessionStore`](crate::context::SessionStore);
/// the backend session layer knows nothing about front-end handles.
#[derive(Debug, Default)]
pub struct SessionCorrelator {
    sessions: RwLock<HashMap<FrontendHandle, SessionId>>,
    handle_locks: Mutex<HashMap<FrontendHandle, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session recorded for `handle`, if any message has completed.
    pub fn session_for(&self, handle: &FrontendHandle) -> Option<SessionId> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
    }

    /// Drop the mapping for `handle`; its next message starts a new session.
    ///
    /// Waits for an exchange already running on `handle` to finish first, so
    /// that exchange cannot write its session back after the mapping is gone.
    /// The handle's lock stays registered and keeps later messages in order.
    pub async fn forget(&self, handle: &FrontendHandle) -> Option<SessionId> {
        let lock = self.handle_lock(handle);
        let _turn = lock.lock().await;
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `text` for `handle` through `backend` and record the session the
    /// reply names.
    ///
    /// A failed exchange leaves the mapping untouched, so the next message
    /// retries against the same session.
    pub async fn exchange(
        &self,
        backend: &dyn AgentBackend,
        handle: &FrontendHandle,
        text: &str,
    ) -> Result<AgentReply> {
        let lock = self.handle_lock(handle);
        let _turn = lock.lock().await;

        let current = self.session_for(handle);
        let reply = backend.send_message(text, current.as_ref()).await?;
        self.record(handle, current.as_ref(), &reply.session_id);
        Ok(reply)
    }

    /// [`exchange`](Self::exchange), abandoned as soon as `cancel` fires.
    ///
    /// A cancelled exchange returns [`TetherError::Cancelled`] and records
    /// nothing, even if the backend had already processed the message.
    pub async fn exchange_cancellable(
        &self,
        backend: &dyn AgentBackend,
        handle: &FrontendHandle,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentReply> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(handle = %handle, "Exchange cancelled");
                Err(TetherError::Cancelled)
            }
            reply = self.exchange(backend, handle, text) => reply,
        }
    }

    fn handle_lock(&self, handle: &FrontendHandle) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.handle_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(handle.clone()).or_default().clone()
    }

    fn record(&self, handle: &FrontendHandle, previous: Option<&SessionId>, returned: &SessionId) {
        if previous == Some(returned) {
            return;
        }
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.clone(), returned.clone());
        match previous {
            None => tracing::info!(handle = %handle, session_id = %returned, "Session bound"),
            Some(previous) => tracing::info!(
                handle = %handle,
                previous = %previous,
                session_id = %returned,
                "Session replaced by backend"
            ),
        }
    }
}
