//! Session context store.
//!
//! Maps a [`SessionId`] to the resources bound to that backend session: the
//! agent, the gateway client and the gateway URL. The map lock is held only
//! to look up, insert or remove a session's slot; each slot has its own async
//! mutex, so work on one session never blocks another while every
//! check-then-set on a single session stays atomic.
//!
//! A slot removed by teardown or eviction is marked retired. Callers that
//! looked the slot up before it was removed see the mark once they hold its
//! mutex and resolve the session again, so nothing is written into a slot the
//! map no longer reaches.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::ambient;
use crate::types::SessionId;

/// Resources owned by one backend session.
///
/// Every field starts unset and is only ever replaced by an explicit setter;
/// fields are cleared solely by tearing the session down.
pub struct SessionRecord<A, G> {
    agent: Option<Arc<A>>,
    gateway_client: Option<Arc<G>>,
    gateway_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl<A, G> SessionRecord<A, G> {
    fn new() -> Self {
        Self {
            agent: None,
            gateway_client: None,
            gateway_url: None,
            created_at: Utc::now(),
        }
    }

    pub fn agent(&self) -> Option<&Arc<A>> {
        self.agent.as_ref()
    }

    pub fn gateway_client(&self) -> Option<&Arc<G>> {
        self.gateway_client.as_ref()
    }

    pub fn gateway_url(&self) -> Option<&str> {
        self.gateway_url.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn into_gateway_client(self) -> Option<Arc<G>> {
        self.gateway_client
    }
}

impl<A, G> fmt::Debug for SessionRecord<A, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("agent", &self.agent.as_ref().map(|_| ".."))
            .field("gateway_client", &self.gateway_client.as_ref().map(|_| ".."))
            .field("gateway_url", &self.gateway_url)
            .field("created_at", &self.created_at)
            .finish()
    }
}

fn agent_field<A, G>(record: &mut SessionRecord<A, G>) -> &mut Option<Arc<A>> {
    &mut record.agent
}

fn gateway_client_field<A, G>(record: &mut SessionRecord<A, G>) -> &mut Option<Arc<G>> {
    &mut record.gateway_client
}

/// Field presence for one session, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub has_agent: bool,
    pub has_gateway_client: bool,
    pub gateway_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

struct SessionSlot<A, G> {
    record: Mutex<SessionRecord<A, G>>,
    last_access: AtomicU64,
    /// Set, under the map write lock, when the slot leaves the map.
    retired: AtomicBool,
}

impl<A, G> SessionSlot<A, G> {
    fn new(tick: u64) -> Self {
        Self {
            record: Mutex::new(SessionRecord::new()),
            last_access: AtomicU64::new(tick),
            retired: AtomicBool::new(false),
        }
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

/// Concurrency-safe registry of per-session resources.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
/// `A` is the agent type, `G` the gateway client type; both are stored as
/// `Arc`s so readers get cheap shared handles.
///
/// With a capacity set, inserting a session beyond it evicts the least
/// recently accessed idle one. A session whose mutex is held (a factory
/// running, say) is skipped, so the store can briefly sit above capacity.
/// Evicted resources are dropped, not closed; use
/// [`SessionStore::teardown`] when a resource needs an explicit shutdown.
///
/// # Example
/// ```
/// use tether::context::SessionStore;
/// use tether::types::SessionId;
///
/// # async fn example() {
/// let store: SessionStore<String, ()> = SessionStore::new();
/// let id = SessionId::new("sess-A");
/// assert!(store.agent(&id).await.is_none());
///
/// store.set_agent(&id, "agent".to_string()).await;
/// assert_eq!(store.agent(&id).await.as_deref(), Some(&"agent".to_string()));
/// # }
/// ```
pub struct SessionStore<A, G> {
    slots: RwLock<HashMap<SessionId, Arc<SessionSlot<A, G>>>>,
    capacity: Option<usize>,
    clock: AtomicU64,
}

impl<A, G> Default for SessionStore<A, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, G> fmt::Debug for SessionStore<A, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<A, G> SessionStore<A, G> {
    /// Unbounded store.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            capacity: None,
            clock: AtomicU64::new(0),
        }
    }

    /// Store holding at most `capacity` sessions (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Create an empty record for `id` if none exists. Idempotent.
    pub fn ensure_session(&self, id: &SessionId) {
        self.ensure_slot(id);
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.read_slots().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.read_slots().keys().cloned().collect()
    }

    pub async fn agent(&self, id: &SessionId) -> Option<Arc<A>> {
        self.read(id, |record| record.agent.clone()).await?
    }

    pub async fn set_agent(&self, id: &SessionId, agent: impl Into<Arc<A>>) {
        let agent = agent.into();
        self.update(id, |record| record.agent = Some(agent)).await;
    }

    pub async fn gateway_client(&self, id: &SessionId) -> Option<Arc<G>> {
        self.read(id, |record| record.gateway_client.clone()).await?
    }

    pub async fn set_gateway_client(&self, id: &SessionId, client: impl Into<Arc<G>>) {
        let client = client.into();
        self.update(id, |record| record.gateway_client = Some(client)).await;
    }

    pub async fn gateway_url(&self, id: &SessionId) -> Option<String> {
        self.read(id, |record| record.gateway_url.clone()).await?
    }

    pub async fn set_gateway_url(&self, id: &SessionId, url: impl Into<String>) {
        let url = url.into();
        self.update(id, |record| record.gateway_url = Some(url)).await;
    }

    /// Return the session's gateway client, building it with `factory` if
    /// there is none yet.
    ///
    /// The session lock is held while `factory` runs, so concurrent callers
    /// for the same session wait and then observe the stored client: the
    /// factory runs at most once per successful creation. If it fails,
    /// nothing is cached and the error is returned unchanged.
    pub async fn get_or_create_gateway_client<F, Fut, E>(
        &self,
        id: &SessionId,
        factory: F,
    ) -> Result<Arc<G>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<G, E>>,
    {
        self.get_or_init(id, gateway_client_field, factory).await
    }

    /// Return the session's agent, building it with `factory` if there is
    /// none yet. Same exactly-once guarantee as
    /// [`get_or_create_gateway_client`](Self::get_or_create_gateway_client).
    pub async fn get_or_create_agent<F, Fut, E>(&self, id: &SessionId, factory: F) -> Result<Arc<A>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<A, E>>,
    {
        self.get_or_init(id, agent_field, factory).await
    }

    /// Remove a session and hand back everything it owned.
    ///
    /// Later reads see the session as never created. Unknown ids are a no-op.
    /// An operation already holding the session's mutex finishes first and
    /// its result is part of the returned record; callers still waiting for
    /// the mutex start over on a fresh session.
    pub async fn teardown(&self, id: &SessionId) -> Option<SessionRecord<A, G>> {
        let slot = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.remove(id)?;
            slot.retire();
            slot
        };
        let mut record = slot.record.lock().await;
        tracing::info!(session_id = %id, "Session torn down");
        Some(std::mem::replace(&mut *record, SessionRecord::new()))
    }

    pub async fn snapshot(&self, id: &SessionId) -> Option<SessionSnapshot> {
        self.read(id, |record| SessionSnapshot {
            session_id: id.clone(),
            has_agent: record.agent.is_some(),
            has_gateway_client: record.gateway_client.is_some(),
            gateway_url: record.gateway_url.clone(),
            created_at: record.created_at,
        })
        .await
    }

    /// Ensure `id` exists, then run `future` with it as the ambient session.
    pub async fn enter<F: Future>(&self, id: SessionId, future: F) -> F::Output {
        self.ensure_session(&id);
        ambient::with_session(id, future).await
    }

    /// Agent of the ambient session.
    pub async fn current_agent(&self) -> Option<Arc<A>> {
        let id = ambient::current_session()?;
        self.agent(&id).await
    }

    /// Store `agent` for the ambient session. Returns `false` (and stores
    /// nothing) when no session is in scope.
    pub async fn set_current_agent(&self, agent: impl Into<Arc<A>>) -> bool {
        match ambient::current_session() {
            Some(id) => {
                self.set_agent(&id, agent).await;
                true
            }
            None => {
                tracing::debug!("No ambient session, agent not stored");
                false
            }
        }
    }

    /// Gateway client of the ambient session.
    pub async fn current_gateway_client(&self) -> Option<Arc<G>> {
        let id = ambient::current_session()?;
        self.gateway_client(&id).await
    }

    pub async fn set_current_gateway_client(&self, client: impl Into<Arc<G>>) -> bool {
        match ambient::current_session() {
            Some(id) => {
                self.set_gateway_client(&id, client).await;
                true
            }
            None => {
                tracing::debug!("No ambient session, gateway client not stored");
                false
            }
        }
    }

    /// Gateway URL of the ambient session.
    pub async fn current_gateway_url(&self) -> Option<String> {
        let id = ambient::current_session()?;
        self.gateway_url(&id).await
    }

    pub async fn set_current_gateway_url(&self, url: impl Into<String>) -> bool {
        match ambient::current_session() {
            Some(id) => {
                self.set_gateway_url(&id, url).await;
                true
            }
            None => {
                tracing::debug!("No ambient session, gateway url not stored");
                false
            }
        }
    }

    async fn get_or_init<T, F, Fut, E>(
        &self,
        id: &SessionId,
        field: fn(&mut SessionRecord<A, G>) -> &mut Option<Arc<T>>,
        init: F,
    ) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            let slot = self.ensure_slot(id);
            let mut record = slot.record.lock().await;
            if slot.is_retired() {
                continue;
            }
            if let Some(existing) = field(&mut *record) {
                return Ok(existing.clone());
            }
            let created = Arc::new(init().await?);
            *field(&mut *record) = Some(created.clone());
            return Ok(created);
        }
    }

    /// Run `apply` on the live record for `id`, creating it if needed.
    async fn update<R>(&self, id: &SessionId, apply: impl FnOnce(&mut SessionRecord<A, G>) -> R) -> R {
        loop {
            let slot = self.ensure_slot(id);
            let mut record = slot.record.lock().await;
            if slot.is_retired() {
                continue;
            }
            return apply(&mut *record);
        }
    }

    /// Run `view` on the live record for `id`; `None` if there is none.
    async fn read<R>(&self, id: &SessionId, view: impl FnOnce(&SessionRecord<A, G>) -> R) -> Option<R> {
        loop {
            let slot = self.slot(id)?;
            let record = slot.record.lock().await;
            if slot.is_retired() {
                continue;
            }
            return Some(view(&*record));
        }
    }

    fn read_slots(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<SessionId, Arc<SessionSlot<A, G>>>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn slot(&self, id: &SessionId) -> Option<Arc<SessionSlot<A, G>>> {
        let slot = self.read_slots().get(id).cloned()?;
        slot.last_access.store(self.tick(), Ordering::Relaxed);
        Some(slot)
    }

    fn ensure_slot(&self, id: &SessionId) -> Arc<SessionSlot<A, G>> {
        if let Some(slot) = self.slot(id) {
            return slot;
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(id) {
            slot.last_access.store(self.tick(), Ordering::Relaxed);
            return slot.clone();
        }

        let slot = Arc::new(SessionSlot::new(self.tick()));
        slots.insert(id.clone(), slot.clone());
        tracing::debug!(session_id = %id, "Session record created");

        if let Some(capacity) = self.capacity {
            evict_idle(&mut slots, capacity, id);
        }

        slot
    }
}

/// Evict least recently accessed sessions until `slots` fits `capacity`.
///
/// `keep` and any slot whose mutex is currently held are never chosen.
fn evict_idle<A, G>(
    slots: &mut HashMap<SessionId, Arc<SessionSlot<A, G>>>,
    capacity: usize,
    keep: &SessionId,
) {
    if slots.len() <= capacity {
        return;
    }
    let mut candidates: Vec<(u64, SessionId)> = slots
        .iter()
        .filter(|(key, _)| *key != keep)
        .map(|(key, slot)| (slot.last_access.load(Ordering::Relaxed), key.clone()))
        .collect();
    candidates.sort_unstable_by_key(|(tick, _)| *tick);

    for (_, victim) in candidates {
        if slots.len() <= capacity {
            return;
        }
        let idle = slots.get(&victim).is_some_and(|slot| match slot.record.try_lock() {
            Ok(_record) => {
                slot.retire();
                true
            }
            Err(_) => false,
        });
        if !idle {
            tracing::debug!(session_id = %victim, "Session busy, not evicted");
            continue;
        }
        slots.remove(&victim);
        tracing::info!(
            session_id = %victim,
            capacity,
            "Evicted least recently used session"
        );
    }
    if slots.len() > capacity {
        tracing::warn!(
            sessions = slots.len(),
            capacity,
            "Every other session is busy, store above capacity"
        );
    }
}
