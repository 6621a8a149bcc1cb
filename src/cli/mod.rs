//! CLI entry point for tether.

pub mod token;

use clap::{Parser, Subcommand};

/// Session-aware chat client for A2A agent runtimes
#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "tether: chat with an A2A agent runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Issue an identity token with the configured client credentials
    Token(TokenArgs),
    /// Chat with the configured agent runtime
    Chat(ChatArgs),
    /// Print the resolved configuration (secrets redacted)
    Config,
}

/// Arguments for `tether token`.
#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Print the full token response instead of only the access token
    #[arg(long)]
    pub verbose: bool,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Conversation handle; messages with the same handle share a backend session
    #[arg(long, default_value = "cli")]
    pub handle: String,

    /// Preamble prepended to each message (overrides TETHER_CHAT_PREAMBLE)
    #[arg(long)]
    pub preamble: Option<String>,

    /// Send one message and exit; without it, read messages from stdin
    pub prompt: Option<String>,
}
