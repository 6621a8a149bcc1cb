//! Session context: the per-session resource store and the request-scoped
//! ambient carrier that tells downstream code which session it serves.

pub mod ambient;
pub mod store;

pub use ambient::{
    current_context, current_identity_token, current_session, with_context,
    with_identity_token, with_session, RequestContext,
};
pub use store::{SessionRecord, SessionSnapshot, SessionStore};
