// Token CLI commands: read, refresh, export.

use crate::auth::TokenStore;
use crate::constants::DEFAULT_PORT;
use crate::error::AppResult;

pub fn read_token() -> AppResult<()> {
    let store = TokenStore::new()?;
    let token = store.read()?;

    println!("Token file: {}", store.path().display());
    println!("Access Token: {}", token.access_token);
    println!("Refresh Token: {}", token.refresh_token);
    if let Some(expires_at) = &token.expires_at {
        println!("Expires At: {}", expires_at);
    }
    Ok(())
}

pub async fn refresh_token() -> AppResult<()> {
    let store = TokenStore::new()?;
    let token = store.refresh().await?;

    println!("Token refreshed successfully!");
    println!("New Access Token: {}", token.access_token);
    Ok(())
}

pub fn export_env_vars() -> AppResult<()> {
    let store = TokenStore::new()?;
    let token = store.read()?;
    print_env_exports(&token.access_token);
    Ok(())
}

/// Print shell statements pointing Anthropic clients at the proxy.
pub(crate) fn print_env_exports(access_token: &str) {
    let base_url = format!("http://localhost:{}", DEFAULT_PORT);
    if cfg!(windows) {
        println!("$env:ANTHROPIC_BASE_URL = \"{}\"", base_url);
        println!("$env:ANTHROPIC_API_KEY = \"{}\"", access_token);
    } else {
        println!("export ANTHROPIC_BASE_URL={}", base_url);
        println!("export ANTHROPIC_API_KEY=\"{}\"", access_token);
    }
}
