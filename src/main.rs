//! tether CLI binary entry point.

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether::cli::{ChatArgs, Cli, Commands};
use tether::config::TetherConfig;
use tether::correlator::ChatRelay;
use tether::types::FrontendHandle;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Token(args) => tether::cli::token::handle_token(args.verbose).await,
        Commands::Chat(args) => handle_chat(args).await,
        Commands::Config => handle_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn handle_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = TetherConfig::from_env()?;
    println!("{config:#?}");
    println!("runtime: {}", config.resolved_runtime_url());
    Ok(())
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = TetherConfig::from_env()?;
    let mut relay = ChatRelay::from_config(&config)?;
    if let Some(preamble) = args.preamble {
        relay = relay.with_preamble(preamble);
    }
    let handle = FrontendHandle::new(args.handle);

    if let Some(prompt) = args.prompt {
        let reply = relay.handle_message(&handle, &prompt).await?;
        println!("{reply}");
        return Ok(());
    }

    // Ctrl-C abandons the in-flight message and ends the session loop.
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    eprintln!("Connected to {}. One message per line, Ctrl-D to quit.", config.resolved_runtime_url());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match relay.handle_message_cancellable(&handle, text, &cancel).await {
            Ok(reply) => println!("{reply}"),
            Err(tether::error::TetherError::Cancelled) => break,
            Err(e) => eprintln!("❌ {e}"),
        }
    }

    if let Some(session) = relay.correlator().session_for(&handle) {
        eprintln!("Session: {session}");
    }
    Ok(())
}
