//! CLI handler for `tether token`.

use crate::auth::issue_token;
use crate::config::TetherConfig;

/// Handle `tether token`.
pub async fn handle_token(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = TetherConfig::from_env()?;
    let credentials = config.identity_credentials()?;
    let client = reqwest::Client::new();

    let token = issue_token(&client, &credentials).await?;
    if verbose {
        eprintln!("token type: {}", token.token_type);
        eprintln!("expires in: {}s (at {})", token.expires_in, token.expires_at());
    }
    println!("{}", token.access_token);
    Ok(())
}
