//! Request-scoped ambient values.
//!
//! The current session id and identity token are held in a tokio task-local,
//! so they follow one request across every `.await` without being threaded
//! through call signatures, and concurrently running requests never observe
//! each other's values. Leaving a scope (normally, by error, by panic or by
//! the future being dropped) restores whatever was in scope before.
//!
//! Task-locals do not cross `tokio::spawn`. Code that spawns work on behalf
//! of a request must carry the context over explicitly:
//!
//! ```no_run
//! use tether::context::ambient;
//!
//! # async fn example() {
//! let ctx = ambient::current_context();
//! tokio::spawn(ambient::with_context(ctx, async {
//!     // ambient values are visible here
//! }));
//! # }
//! ```

use std::future::Future;

use crate::types::{IdentityToken, SessionId};

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Values ambient for the duration of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub session_id: Option<SessionId>,
    pub identity_token: Option<IdentityToken>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_identity_token(mut self, token: IdentityToken) -> Self {
        self.identity_token = Some(token);
        self
    }
}

/// Run `future` with `context` as the ambient request context.
pub async fn with_context<F: Future>(context: RequestContext, future: F) -> F::Output {
    REQUEST_CONTEXT.scope(context, future).await
}

/// Run `future` with `session_id` ambient, keeping the current identity token.
pub async fn with_session<F: Future>(session_id: SessionId, future: F) -> F::Output {
    let context = current_context().with_session_id(session_id);
    with_context(context, future).await
}

/// Run `future` with `token` ambient, keeping the current session id.
pub async fn with_identity_token<F: Future>(token: IdentityToken, future: F) -> F::Output {
    let context = current_context().with_identity_token(token);
    with_context(context, future).await
}

/// Snapshot of the ambient context; empty outside any scope.
pub fn current_context() -> RequestContext {
    REQUEST_CONTEXT
        .try_with(|context| context.clone())
        .unwrap_or_default()
}

/// The ambient session id, or `None` when no request scope set one.
pub fn current_session() -> Option<SessionId> {
    REQUEST_CONTEXT
        .try_with(|context| context.session_id.clone())
        .ok()
        .flatten()
}

/// The ambient identity token, or `None` when no request scope set one.
pub fn current_identity_token() -> Option<IdentityToken> {
    REQUEST_CONTEXT
        .try_with(|context| context.identity_token.clone())
        .ok()
        .flatten()
}
