//! Core types for tether.

pub mod identity;
pub mod session;

pub use identity::IdentityToken;
pub use session::{FrontendHandle, SessionId};
