//! tether: session context layer for chat front-ends talking to agent
//! runtimes.
//!
//! A chat UI hands each message to a [`ChatRelay`](correlator::ChatRelay),
//! which correlates the UI conversation with a backend agent session and
//! sends the message over A2A. On the runtime side,
//! [`SessionRuntime`](runtime::SessionRuntime) makes the session ambient for
//! the duration of the request and lazily builds, once per session, the
//! gateway client and agent kept in a [`SessionStore`](context::SessionStore).
//!
//! # Quick Start
//!
//! ```no_run
//! use tether::prelude::*;
//!
//! # async fn example() -> tether::error::Result<()> {
//! let config = TetherConfig::from_env()?;
//! let relay = ChatRelay::from_config(&config)?;
//! let handle = FrontendHandle::new("conversation-1");
//! let reply = relay.handle_message(&handle, "When is my technician arriving?").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod config;
pub mod context;
pub mod correlator;
pub mod error;
pub mod gateway;
pub mod prelude;
pub mod runtime;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
